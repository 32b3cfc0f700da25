//! The charge protocol seam between orchestration and the PSP transport.
//!
//! [`ChargeProtocol`] abstracts the four PSP operations the orchestration
//! layer needs. The concrete HTTP implementation lives in `pixcob-psp`;
//! tests substitute in-memory fakes.

use std::future::Future;
use std::pin::Pin;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::charge::{ChargeStatus, Debtor, Settlement};
use crate::error::PspError;

/// Boxed future used by object-safe protocol methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Parameters for creating a charge with due date (COBV).
#[derive(Debug, Clone)]
pub struct CreateChargeDue {
    /// Transaction identifier (26-35 alphanumeric chars).
    pub txid: String,
    /// Original charge amount, must be positive.
    pub amount: Decimal,
    /// Who owes the charge.
    pub debtor: Debtor,
    /// Receiving PIX key.
    pub pix_key: String,
    /// Due date.
    pub due_date: NaiveDate,
    /// Days the charge stays payable after the due date.
    pub validity_after_due_days: u32,
    /// Late fee percent applied after the due date.
    pub late_fee_percent: Decimal,
    /// Monthly interest percent applied after the due date.
    pub monthly_interest_percent: Decimal,
    /// Free text shown to the payer (≤140 chars).
    pub description: String,
}

/// Partial update for an existing charge; only supplied fields are sent.
#[derive(Debug, Clone, Default)]
pub struct ChargeUpdate {
    /// New amount, if changing.
    pub amount: Option<Decimal>,
    /// New debtor, if changing.
    pub debtor: Option<Debtor>,
    /// New payer-facing description, if changing.
    pub description: Option<String>,
}

/// The PSP's representation of a charge, as returned by create/query/revise.
#[derive(Debug, Clone)]
pub struct PspCharge {
    /// Transaction identifier.
    pub txid: String,
    /// PSP-reported status.
    pub status: ChargeStatus,
    /// PSP-side revision number, when reported.
    pub revision: Option<u32>,
    /// Payload URL for deriving the EMV string, when issued.
    pub location: Option<String>,
    /// Ready-made copy-paste payable string, when issued.
    pub payable_text: Option<String>,
    /// Settlement details, populated on concluded charges.
    pub settlement: Option<Settlement>,
}

impl PspCharge {
    /// The settlement record, but only when the PSP reports the charge as
    /// concluded. Guards against PSPs that echo partial payment events on
    /// still-open charges.
    #[must_use]
    pub fn settlement_if_concluded(&self) -> Option<&Settlement> {
        (self.status == ChargeStatus::Concluded)
            .then_some(self.settlement.as_ref())
            .flatten()
    }
}

/// Charge lifecycle operations against a PSP.
///
/// All operations are asynchronous and authenticated by the implementation
/// (bearer token over mutual TLS for the HTTP transport).
pub trait ChargeProtocol: Send + Sync {
    /// Idempotent create-or-replace of a charge with due date, keyed by
    /// `request.txid`.
    fn create_charge_due<'a>(
        &'a self,
        request: &'a CreateChargeDue,
    ) -> BoxFuture<'a, Result<PspCharge, PspError>>;

    /// Fetches the current PSP-side state of a charge, or a specific
    /// revision when `revision` is given.
    fn query_charge<'a>(
        &'a self,
        txid: &'a str,
        revision: Option<u32>,
    ) -> BoxFuture<'a, Result<PspCharge, PspError>>;

    /// Applies a partial update to an existing charge.
    fn revise_charge<'a>(
        &'a self,
        txid: &'a str,
        update: &'a ChargeUpdate,
    ) -> BoxFuture<'a, Result<PspCharge, PspError>>;

    /// Queries the charge and returns its settlement record when the PSP
    /// reports it as concluded, `None` otherwise.
    fn check_settlement<'a>(
        &'a self,
        txid: &'a str,
    ) -> BoxFuture<'a, Result<Option<Settlement>, PspError>> {
        Box::pin(async move {
            let charge = self.query_charge(txid, None).await?;
            Ok(charge.settlement_if_concluded().cloned())
        })
    }
}
