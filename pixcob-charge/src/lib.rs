#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Charge orchestration against billing records.
//!
//! This crate ties the `pixcob` core and the `pixcob-psp` transport
//! together into the operation the billing platform actually calls:
//! issue a PIX charge for a billing record (idempotently, with collision
//! retry and QR rendering) and poll emitted charges for settlement.
//!
//! # Modules
//!
//! - [`store`] - [`ChargeStore`](store::ChargeStore) persistence seam and
//!   an in-memory implementation
//! - [`qr`] - QR bitmap rendering for the EMV payable string
//! - [`service`] - [`ChargeService`](service::ChargeService) with
//!   `generate_charge` and `poll_settlements`
//!
//! # Guarantees
//!
//! `generate_charge` is all-or-nothing: a billing record either ends up
//! with a complete, consistent set of PIX fields or with none of them.
//! `poll_settlements` isolates per-charge failures; one failing PSP call
//! never aborts the batch.

pub mod qr;
pub mod service;
pub mod store;
