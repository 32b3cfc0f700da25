//! Charge, debtor and settlement data model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// PSP-reported lifecycle status of a charge.
///
/// State machine: `Requested → Active → {Concluded | Expired |
/// RemovedByReceivingUser}`. Locally a billing record mirrors `Active` as
/// emitted and `Concluded` as paid; other terminal states are surfaced but
/// never auto-cancel the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ChargeStatus {
    /// Charge submitted, not yet confirmed by the PSP.
    Requested,
    /// Charge is live and payable.
    Active,
    /// Charge was paid; a settlement record exists.
    Concluded,
    /// Validity window elapsed without payment.
    Expired,
    /// The receiving user removed the charge at the PSP.
    RemovedByReceivingUser,
    /// A status this client version does not know.
    #[serde(other)]
    Unknown,
}

impl ChargeStatus {
    /// Whether the charge can still transition (not yet settled, expired
    /// or removed).
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Requested | Self::Active)
    }
}

/// Local billing-record mirror of the PSP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalStatus {
    /// Charge issued and awaiting payment.
    Emitted,
    /// Settlement confirmed by the PSP.
    Paid,
}

/// Debtor identity attached to a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debtor {
    /// Full legal name.
    pub name: String,
    /// CPF or CNPJ, digits only (formatting is stripped on construction).
    pub document: String,
}

/// Brazilian taxpayer document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Natural person (11 digits).
    Cpf,
    /// Legal entity (14 digits).
    Cnpj,
}

impl Debtor {
    /// Creates a debtor, keeping only the digits of `document`.
    #[must_use]
    pub fn new(name: impl Into<String>, document: &str) -> Self {
        Self {
            name: name.into(),
            document: document.chars().filter(char::is_ascii_digit).collect(),
        }
    }

    /// Discriminates CPF from CNPJ by digit count: exactly 11 digits is a
    /// CPF, anything else is treated as a CNPJ.
    #[must_use]
    pub fn document_kind(&self) -> DocumentKind {
        if self.document.len() == 11 {
            DocumentKind::Cpf
        } else {
            DocumentKind::Cnpj
        }
    }
}

/// The party that paid a settled charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    /// Payer name, when reported by the PSP.
    pub name: Option<String>,
    /// Payer CPF/CNPJ digits, when reported.
    pub document: Option<String>,
}

/// Settlement details of a concluded charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    /// End-to-end identifier of the PIX transfer.
    pub end_to_end_id: String,
    /// Who paid.
    pub payer: Payer,
    /// Amount actually paid.
    pub amount: Decimal,
    /// When the PSP registered the payment.
    pub paid_at: DateTime<Utc>,
}

/// A PIX charge with due date as tracked against a billing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    /// Transaction identifier keying the charge at the PSP.
    pub txid: String,
    /// PSP-reported status.
    pub status: ChargeStatus,
    /// Original charge amount.
    pub amount: Decimal,
    /// Who owes the charge.
    pub debtor: Debtor,
    /// Due date of the charge.
    pub due_date: NaiveDate,
    /// Days the charge stays payable after the due date.
    pub validity_after_due_days: u32,
    /// Late fee applied after the due date, percent of the amount.
    pub late_fee_percent: Decimal,
    /// Monthly interest applied after the due date, percent.
    pub monthly_interest_percent: Decimal,
    /// Free-text shown to the payer (≤140 chars).
    pub description: String,
    /// PSP-issued payload URL, when returned.
    pub location: Option<String>,
    /// EMV copy-paste string.
    pub payable_text: String,
    /// Rendered QR bitmap (PNG bytes).
    #[serde(with = "serde_bytes_base64")]
    pub qr_image: Vec<u8>,
    /// When the charge was created locally.
    pub created_at: DateTime<Utc>,
    /// PSP-side revision number, when known.
    pub revision: Option<u32>,
}

/// Serializes QR bitmap bytes as base64 so charges stay JSON-friendly.
mod serde_bytes_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as b64;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&b64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        b64.decode(&s).map_err(de::Error::custom)
    }
}
