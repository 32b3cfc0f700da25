//! Decimal amount validation and BRL wire formatting.

use rust_decimal::Decimal;

use crate::error::PspError;

/// Formats an amount the way the PSP and the EMV payload expect it:
/// plain decimal, dot separator, exactly two fractional digits.
#[must_use]
pub fn format_brl(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// Rejects zero and negative charge amounts.
///
/// # Errors
///
/// Returns [`PspError::Validation`] when `amount <= 0`.
pub fn ensure_positive(amount: Decimal) -> Result<(), PspError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(PspError::validation(format!(
            "charge amount must be positive, got {amount}"
        )))
    }
}
