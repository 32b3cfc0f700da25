//! Charge orchestration service.
//!
//! [`ChargeService`] implements the two operations the billing platform
//! calls: [`ChargeService::generate_charge`] issues a PIX charge for a
//! billing record and [`ChargeService::poll_settlements`] walks emitted
//! charges looking for payments.
//!
//! Issuance is idempotent per record, retries a txid collision exactly
//! once with a freshly generated identifier, and persists nothing unless
//! every step (PSP create, EMV encoding, QR render) succeeded. Settlement
//! polling fans out with bounded concurrency and isolates per-charge
//! failures.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use rust_decimal::Decimal;

use pixcob::charge::{Charge, ChargeStatus, Debtor, LocalStatus, Settlement};
use pixcob::emv::{self, EmvParams};
use pixcob::error::{ErrorClass, PspError};
use pixcob::protocol::{ChargeProtocol, CreateChargeDue};
use pixcob::txid;
use pixcob_psp::config::PspConfig;

use crate::qr::{self, QrError};
use crate::store::{BillingRecord, ChargeRecord, ChargeStore, StoreError};

/// Default bound on concurrent settlement queries.
pub const DEFAULT_POLL_CONCURRENCY: usize = 8;

/// Orchestration failure.
#[derive(Debug, thiserror::Error)]
pub enum ChargeError {
    /// A PSP operation failed; see [`PspError`] for the taxonomy.
    #[error(transparent)]
    Psp(#[from] PspError),

    /// The billing record is missing a required input.
    #[error("invalid billing record: {0}")]
    Validation(String),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The QR bitmap could not be rendered.
    #[error(transparent)]
    Qr(#[from] QrError),

    /// The PSP accepted the charge but returned neither a payable string
    /// nor a location to derive one from.
    #[error("PSP response carried neither a payable string nor a location")]
    IncompletePspResponse,
}

/// Receiver and default charge terms used during issuance.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// PIX key receiving the payments.
    pub pix_key: String,
    /// Receiver display name (EMV field 59).
    pub receiver_name: String,
    /// Receiver city (EMV field 60).
    pub receiver_city: String,
    /// Late fee percent applied after the due date.
    pub late_fee_percent: Decimal,
    /// Monthly interest percent applied after the due date.
    pub monthly_interest_percent: Decimal,
    /// Days a charge stays payable after its due date.
    pub validity_after_due_days: u32,
    /// Bound on concurrent settlement queries.
    pub poll_concurrency: usize,
}

impl ServiceSettings {
    /// Derives service settings from the PSP configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ChargeError::Validation`] when a configured percentage
    /// cannot be represented as a decimal.
    pub fn from_psp_config(config: &PspConfig) -> Result<Self, ChargeError> {
        let to_decimal = |value: f64, field: &str| {
            Decimal::try_from(value)
                .map_err(|e| ChargeError::Validation(format!("invalid {field} in config: {e}")))
        };
        Ok(Self {
            pix_key: config.pix_key.clone(),
            receiver_name: config.receiver_name.clone(),
            receiver_city: config.receiver_city.clone(),
            late_fee_percent: to_decimal(
                config.default_late_fee_percent,
                "default_late_fee_percent",
            )?,
            monthly_interest_percent: to_decimal(
                config.default_monthly_interest_percent,
                "default_monthly_interest_percent",
            )?,
            validity_after_due_days: config.default_validity_days,
            poll_concurrency: DEFAULT_POLL_CONCURRENCY,
        })
    }
}

/// Which charges a settlement poll covers.
#[derive(Debug, Clone)]
pub enum PollScope {
    /// Specific billing records.
    Records(Vec<String>),
    /// Every record whose local status is emitted.
    AllEmitted,
}

/// Per-charge outcome of a settlement poll.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The PSP reported the charge concluded; the record is now paid.
    Paid(Settlement),
    /// The charge is still open at the PSP.
    StillOpen(ChargeStatus),
    /// The charge closed without payment (expired or removed); surfaced,
    /// record not auto-cancelled.
    Closed(ChargeStatus),
    /// Polling this charge failed; the rest of the batch is unaffected.
    Failed(String),
}

/// One entry of a [`PollReport`].
#[derive(Debug, Clone)]
pub struct PollItem {
    /// Billing record identifier.
    pub record_id: String,
    /// Charge txid, empty when no charge was persisted for the record.
    pub txid: String,
    /// What the poll found.
    pub outcome: PollOutcome,
}

/// Aggregate result of [`ChargeService::poll_settlements`].
#[derive(Debug, Clone)]
pub struct PollReport {
    /// Charges examined (including ones that failed).
    pub checked: usize,
    /// Charges newly confirmed as paid.
    pub paid: usize,
    /// Charges whose poll failed.
    pub failed: usize,
    /// Per-charge detail.
    pub items: Vec<PollItem>,
}

/// Issues PIX charges for billing records and polls them for settlement.
pub struct ChargeService {
    protocol: Arc<dyn ChargeProtocol>,
    store: Arc<dyn ChargeStore>,
    settings: ServiceSettings,
}

impl std::fmt::Debug for ChargeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargeService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ChargeService {
    /// Creates a service over a protocol implementation and a store.
    #[must_use]
    pub fn new(
        protocol: Arc<dyn ChargeProtocol>,
        store: Arc<dyn ChargeStore>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            protocol,
            store,
            settings,
        }
    }

    /// Issues a PIX charge for a billing record.
    ///
    /// Idempotent: when a charge is already persisted for the record and
    /// `force` is false, it is returned unchanged without any network
    /// call. A txid collision at the PSP is retried exactly once with a
    /// freshly generated identifier; a second collision propagates.
    ///
    /// All-or-nothing: the record is persisted only after the PSP create,
    /// the EMV encoding and the QR render all succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ChargeError::Validation`] on missing inputs, a mapped
    /// [`PspError`] on PSP failures, and [`ChargeError::Qr`] /
    /// [`ChargeError::Store`] on rendering and persistence failures.
    pub async fn generate_charge(
        &self,
        record: &BillingRecord,
        force: bool,
    ) -> Result<ChargeRecord, ChargeError> {
        if !force {
            if let Some(existing) = self.store.find(&record.id).await? {
                tracing::debug!(record_id = %record.id, txid = %existing.charge.txid,
                    "record already has a charge, returning it unchanged");
                return Ok(existing);
            }
        }

        let due_date = Self::validated_due_date(record)?;
        let debtor = Debtor::new(record.debtor_name.clone(), &record.debtor_document);
        let description = record.description.clone().unwrap_or_default();

        let mut request = CreateChargeDue {
            txid: txid::generate(&record.debtor_name, &record.debtor_document, Some(&record.id)),
            amount: record.amount,
            debtor: debtor.clone(),
            pix_key: self.settings.pix_key.clone(),
            due_date,
            validity_after_due_days: self.settings.validity_after_due_days,
            late_fee_percent: self.settings.late_fee_percent,
            monthly_interest_percent: self.settings.monthly_interest_percent,
            description: description.clone(),
        };

        let psp_charge = match self.protocol.create_charge_due(&request).await {
            Ok(charge) => charge,
            Err(err) if err.class() == ErrorClass::RetryableConflict => {
                tracing::warn!(record_id = %record.id, txid = %request.txid,
                    "txid collision at PSP, retrying once with a fresh id");
                request.txid =
                    txid::generate(&record.debtor_name, &record.debtor_document, Some(&record.id));
                // A second conflict propagates as fatal.
                self.protocol.create_charge_due(&request).await?
            }
            Err(err) => return Err(err.into()),
        };

        if psp_charge.payable_text.is_none() && psp_charge.location.is_none() {
            return Err(ChargeError::IncompletePspResponse);
        }
        let payable_text = emv::encode_or_reuse(
            psp_charge.payable_text.as_deref(),
            &EmvParams {
                location: psp_charge.location.as_deref().unwrap_or_default(),
                amount: record.amount,
                receiver_name: &self.settings.receiver_name,
                receiver_city: &self.settings.receiver_city,
            },
        );
        let qr_image = qr::render_png(&payable_text)?;

        let local_status = if psp_charge.status == ChargeStatus::Concluded {
            LocalStatus::Paid
        } else {
            LocalStatus::Emitted
        };
        let charge_record = ChargeRecord {
            record_id: record.id.clone(),
            charge: Charge {
                txid: psp_charge.txid.clone(),
                status: psp_charge.status,
                amount: record.amount,
                debtor,
                due_date,
                validity_after_due_days: self.settings.validity_after_due_days,
                late_fee_percent: self.settings.late_fee_percent,
                monthly_interest_percent: self.settings.monthly_interest_percent,
                description,
                location: psp_charge.location.clone(),
                payable_text,
                qr_image,
                created_at: Utc::now(),
                revision: psp_charge.revision,
            },
            local_status,
            settlement: psp_charge.settlement,
        };
        self.store.persist(charge_record.clone()).await?;
        tracing::info!(record_id = %record.id, txid = %charge_record.charge.txid,
            status = ?charge_record.charge.status, "charge issued and persisted");
        Ok(charge_record)
    }

    /// Polls the PSP for settlements over the given scope.
    ///
    /// Charges are queried with bounded concurrency
    /// ([`ServiceSettings::poll_concurrency`]); each failure is recorded
    /// against its item and never aborts the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`ChargeError::Store`] only when the store cannot enumerate
    /// the scope itself; per-charge failures land in the report instead.
    pub async fn poll_settlements(&self, scope: PollScope) -> Result<PollReport, ChargeError> {
        let mut items = Vec::new();
        let candidates = match scope {
            PollScope::AllEmitted => self.store.emitted().await?,
            PollScope::Records(ids) => {
                let mut found = Vec::new();
                for id in ids {
                    match self.store.find(&id).await? {
                        Some(record) => found.push(record),
                        None => items.push(PollItem {
                            record_id: id,
                            txid: String::new(),
                            outcome: PollOutcome::Failed(
                                "no charge persisted for this record".to_owned(),
                            ),
                        }),
                    }
                }
                found
            }
        };

        let concurrency = self.settings.poll_concurrency.max(1);
        let polled: Vec<PollItem> =
            stream::iter(candidates.into_iter().map(|record| self.poll_one(record)))
                .buffer_unordered(concurrency)
                .collect()
                .await;
        items.extend(polled);

        let paid = items
            .iter()
            .filter(|i| matches!(i.outcome, PollOutcome::Paid(_)))
            .count();
        let failed = items
            .iter()
            .filter(|i| matches!(i.outcome, PollOutcome::Failed(_)))
            .count();
        let report = PollReport {
            checked: items.len(),
            paid,
            failed,
            items,
        };
        tracing::info!(checked = report.checked, paid = report.paid, failed = report.failed,
            "settlement poll finished");
        Ok(report)
    }

    async fn poll_one(&self, record: ChargeRecord) -> PollItem {
        let charge_txid = record.charge.txid.clone();
        let outcome = match self.protocol.query_charge(&charge_txid, None).await {
            Ok(psp) => {
                if let Some(settlement) = psp.settlement_if_concluded().cloned() {
                    match self
                        .store
                        .mark_paid(&record.record_id, settlement.clone())
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(record_id = %record.record_id, txid = %charge_txid,
                                end_to_end_id = %settlement.end_to_end_id, "charge settled");
                            PollOutcome::Paid(settlement)
                        }
                        Err(err) => PollOutcome::Failed(err.to_string()),
                    }
                } else if psp.status.is_open() {
                    PollOutcome::StillOpen(psp.status)
                } else {
                    match self
                        .store
                        .update_psp_status(&record.record_id, psp.status)
                        .await
                    {
                        Ok(()) => {
                            tracing::warn!(record_id = %record.record_id, txid = %charge_txid,
                                status = ?psp.status, "charge closed without settlement");
                            PollOutcome::Closed(psp.status)
                        }
                        Err(err) => PollOutcome::Failed(err.to_string()),
                    }
                }
            }
            Err(err) => {
                tracing::warn!(record_id = %record.record_id, txid = %charge_txid,
                    error = %err, "settlement check failed");
                PollOutcome::Failed(err.to_string())
            }
        };
        PollItem {
            record_id: record.record_id,
            txid: charge_txid,
            outcome,
        }
    }

    /// Checks the inputs a charge cannot be created without.
    fn validated_due_date(record: &BillingRecord) -> Result<NaiveDate, ChargeError> {
        if record.amount <= Decimal::ZERO {
            return Err(ChargeError::Validation(format!(
                "amount must be positive, got {}",
                record.amount
            )));
        }
        if record.debtor_name.trim().is_empty() {
            return Err(ChargeError::Validation("debtor name is required".to_owned()));
        }
        if !record.debtor_document.chars().any(|c| c.is_ascii_digit()) {
            return Err(ChargeError::Validation(
                "debtor document is required".to_owned(),
            ));
        }
        record
            .due_date
            .ok_or_else(|| ChargeError::Validation("due date is required".to_owned()))
    }
}
