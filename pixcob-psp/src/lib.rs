#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Mutual-TLS HTTP transport to the PSP charge API (COBV).
//!
//! This crate implements the network-facing half of the `pixcob` ecosystem:
//!
//! - [`config`] - PSP credentials and receiver settings loaded from TOML
//!   with environment-variable expansion
//! - [`identity`] - TLS client identity materialized from a PKCS#12
//!   container
//! - [`auth`] - OAuth2 client-credentials authenticator with a cached,
//!   refresh-serialized access token
//! - [`client`] - [`PspChargeClient`](client::PspChargeClient), the
//!   concrete [`ChargeProtocol`](pixcob::protocol::ChargeProtocol)
//!   implementation
//!
//! All requests to the PSP carry both the mTLS client certificate and a
//! `Bearer` token. HTTP statuses are mapped to the
//! [`PspError`](pixcob::error::PspError) taxonomy with the raw response
//! body preserved for diagnostics.

pub mod auth;
pub mod client;
pub mod config;
pub mod identity;
mod wire;
