//! Persistence seam between charge orchestration and the billing platform.
//!
//! The billing subsystem owns its records; this crate only needs to read
//! the charge previously issued for a record and write the complete set of
//! PIX fields back in one call. [`MemoryStore`] backs tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use pixcob::charge::{Charge, ChargeStatus, LocalStatus, Settlement};

/// What the billing subsystem supplies when requesting a charge.
#[derive(Debug, Clone)]
pub struct BillingRecord {
    /// Billing record identifier.
    pub id: String,
    /// Amount to charge.
    pub amount: Decimal,
    /// Due date; required before a charge can be created.
    pub due_date: Option<NaiveDate>,
    /// Debtor full name.
    pub debtor_name: String,
    /// Debtor CPF/CNPJ, any formatting.
    pub debtor_document: String,
    /// Optional payer-facing description.
    pub description: Option<String>,
}

/// A charge as persisted against a billing record.
#[derive(Debug, Clone)]
pub struct ChargeRecord {
    /// The billing record this charge belongs to (1:0..1).
    pub record_id: String,
    /// The charge itself, including payable text and QR image.
    pub charge: Charge,
    /// Local mirror of the PSP status.
    pub local_status: LocalStatus,
    /// Settlement details once the charge is paid.
    pub settlement: Option<Settlement>,
}

/// Charge store failure.
#[derive(Debug, thiserror::Error)]
#[error("charge store error: {0}")]
pub struct StoreError(pub String);

/// Charge persistence operations, implemented by the billing platform.
///
/// `persist` must be atomic per record: either the whole charge record is
/// written or nothing is.
#[async_trait]
pub trait ChargeStore: Send + Sync {
    /// Returns the charge previously issued for a billing record, if any.
    async fn find(&self, record_id: &str) -> Result<Option<ChargeRecord>, StoreError>;

    /// Writes a complete charge record, replacing any previous one.
    async fn persist(&self, record: ChargeRecord) -> Result<(), StoreError>;

    /// All records whose local status is [`LocalStatus::Emitted`].
    async fn emitted(&self) -> Result<Vec<ChargeRecord>, StoreError>;

    /// Marks a record as paid and attaches the settlement.
    async fn mark_paid(&self, record_id: &str, settlement: Settlement) -> Result<(), StoreError>;

    /// Records a new PSP-side status without touching the local mirror.
    async fn update_psp_status(
        &self,
        record_id: &str,
        status: ChargeStatus,
    ) -> Result<(), StoreError>;
}

/// In-memory [`ChargeStore`] for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ChargeRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChargeStore for MemoryStore {
    async fn find(&self, record_id: &str) -> Result<Option<ChargeRecord>, StoreError> {
        Ok(self.records.read().await.get(record_id).cloned())
    }

    async fn persist(&self, record: ChargeRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.record_id.clone(), record);
        Ok(())
    }

    async fn emitted(&self) -> Result<Vec<ChargeRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.local_status == LocalStatus::Emitted)
            .cloned()
            .collect())
    }

    async fn mark_paid(&self, record_id: &str, settlement: Settlement) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| StoreError(format!("no charge persisted for record {record_id}")))?;
        record.local_status = LocalStatus::Paid;
        record.charge.status = ChargeStatus::Concluded;
        record.settlement = Some(settlement);
        Ok(())
    }

    async fn update_psp_status(
        &self,
        record_id: &str,
        status: ChargeStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| StoreError(format!("no charge persisted for record {record_id}")))?;
        record.charge.status = status;
        Ok(())
    }
}
