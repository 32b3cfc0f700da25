#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types and algorithms for PIX charges with due date (COBV).
//!
//! This crate provides the foundational pieces shared by the `pixcob`
//! ecosystem: transaction identifier generation, the EMV "BR Code" payload
//! encoder with its CRC-16 checksum, the charge data model, and the error
//! taxonomy used across the PSP transport and orchestration layers.
//!
//! The PSP (payment service provider) transport itself lives in
//! `pixcob-psp`; charge orchestration against billing records lives in
//! `pixcob-charge`. This crate stays free of network and runtime
//! dependencies so the wire-format pieces can be tested in isolation.
//!
//! # Modules
//!
//! - [`amount`] - Decimal amount validation and BRL wire formatting
//! - [`charge`] - Charge, debtor and settlement data model
//! - [`crc`] - CRC-16/CCITT-FALSE checksum used by the EMV payload
//! - [`emv`] - EMV BR Code TLV encoding and validation
//! - [`error`] - PSP error taxonomy with retryable/fatal classification
//! - [`protocol`] - The [`ChargeProtocol`](protocol::ChargeProtocol) seam
//!   implemented by the PSP transport
//! - [`sanitize`] - Text sanitizers for EMV fields and txid fragments
//! - [`txid`] - Transaction identifier generation and validation

pub mod amount;
pub mod charge;
pub mod crc;
pub mod emv;
pub mod error;
pub mod protocol;
pub mod sanitize;
pub mod txid;
