//! Transaction identifier (txid) generation for PIX charges.
//!
//! A txid keys a charge at the PSP and must be 26-35 alphanumeric
//! characters. Identifiers produced here embed the debtor's document and
//! first name so operators can eyeball which record a charge belongs to,
//! followed by a millisecond timestamp and random base-36 padding.
//!
//! Uniqueness is probabilistic (time plus randomness), not guaranteed:
//! callers must treat a PSP conflict response as a collision and retry with
//! a freshly generated identifier.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use regex::Regex;

use crate::sanitize;

/// Minimum txid length accepted by the PSP.
pub const MIN_LEN: usize = 26;
/// Maximum txid length accepted by the PSP.
pub const MAX_LEN: usize = 35;

/// Fixed two-character prefix on every generated identifier.
pub const PREFIX: &str = "MW";

const TARGET_LEN: usize = 32;
const NAME_FRAGMENT_MAX: usize = 8;
const TIME_FRAGMENT_LEN: usize = 6;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

static TXID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9]{26,35}$").expect("valid txid regex"));

/// Generates a new transaction identifier for the given debtor.
///
/// Layout: [`PREFIX`] + document digits (or `fallback`, or eleven zeros) +
/// sanitized first name (≤8 chars) + 6 base-36 characters of the current
/// millisecond timestamp, padded with random base-36 characters up to 32
/// and capped at 35.
#[must_use]
pub fn generate(debtor_name: &str, debtor_document: &str, fallback: Option<&str>) -> String {
    let document: String = debtor_document
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    let document = if document.is_empty() {
        fallback
            .map(sanitize::alphanumeric_upper)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "0".repeat(11))
    } else {
        document
    };

    let first_name = debtor_name.split_whitespace().next().unwrap_or("");
    let mut name_fragment = sanitize::alphanumeric_upper(first_name);
    name_fragment.truncate(NAME_FRAGMENT_MAX);

    let mut txid = format!(
        "{PREFIX}{document}{name_fragment}{}",
        timestamp_fragment()
    );
    txid.retain(|c| c.is_ascii_alphanumeric());

    let mut rng = rand::thread_rng();
    while txid.len() < TARGET_LEN {
        txid.push(BASE36[rng.gen_range(0..BASE36.len())] as char);
    }
    txid.truncate(MAX_LEN);
    // Unreachable with the target above, kept as a hard floor.
    while txid.len() < MIN_LEN {
        txid.push(BASE36[rng.gen_range(0..BASE36.len())] as char);
    }
    txid
}

/// Returns `true` when `candidate` satisfies the PSP's txid constraints
/// (26-35 characters, alphanumeric only).
#[must_use]
pub fn is_valid(candidate: &str) -> bool {
    TXID_PATTERN.is_match(candidate)
}

/// The six least-significant base-36 digits of the current millisecond
/// timestamp. Covers ~25 days before wrapping; the random tail disambiguates.
fn timestamp_fragment() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let encoded = to_base36(millis);
    let start = encoded.len().saturating_sub(TIME_FRAGMENT_LEN);
    encoded[start..].to_owned()
}

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 digits are ascii")
}
