//! EMV BR Code TLV encoding and validation.
//!
//! A PIX charge is presented to the payer as a copy-paste string (and QR
//! code) in the EMV merchant-presented format: a flat sequence of
//! `TAG(2) + LEN(2, zero-padded byte length) + VALUE` fields, closed by a
//! CRC-16 over everything up to and including the CRC tag+length
//! placeholder. Wallet scanners are strict about this layout, so the
//! encoder is bit-exact and covered by reference tests.

use rust_decimal::Decimal;

use crate::{amount, crc, sanitize};

/// Maximum byte length of the PSP location URL inside field 26-25.
pub const LOCATION_MAX_LEN: usize = 77;
/// Maximum byte length of the receiver name (field 59).
pub const RECEIVER_NAME_MAX_LEN: usize = 25;
/// Maximum byte length of the receiver city (field 60).
pub const RECEIVER_CITY_MAX_LEN: usize = 15;

const PIX_GUI: &str = "br.gov.bcb.pix";
const CRC_PLACEHOLDER: &str = "6304";

/// Inputs for deriving an EMV payload from a PSP-issued location URL.
#[derive(Debug, Clone)]
pub struct EmvParams<'a> {
    /// PSP-issued payload URL (scheme-less), lower-cased and truncated to
    /// [`LOCATION_MAX_LEN`] during encoding.
    pub location: &'a str,
    /// Charge amount, rendered with exactly two decimals.
    pub amount: Decimal,
    /// Receiver display name.
    pub receiver_name: &'a str,
    /// Receiver city.
    pub receiver_city: &'a str,
}

/// Builds one `TAG + LEN + VALUE` field. Length is the value's byte length.
fn tlv(tag: &str, value: &str) -> String {
    format!("{tag}{len:02}{value}", len = value.len())
}

/// Encodes a dynamic-QR EMV payload from a PSP location URL.
#[must_use]
pub fn encode(params: &EmvParams<'_>) -> String {
    let mut location = params.location.trim().to_lowercase();
    if location.len() > LOCATION_MAX_LEN {
        let mut cut = LOCATION_MAX_LEN;
        while !location.is_char_boundary(cut) {
            cut -= 1;
        }
        location.truncate(cut);
    }

    let merchant_account = format!("{}{}", tlv("00", PIX_GUI), tlv("25", &location));
    let name = sanitize::emv_text(params.receiver_name, RECEIVER_NAME_MAX_LEN);
    let city = sanitize::emv_text(params.receiver_city, RECEIVER_CITY_MAX_LEN);
    let additional = tlv("05", "***");

    let mut payload = String::new();
    payload.push_str(&tlv("00", "01")); // payload format indicator
    payload.push_str(&tlv("01", "12")); // dynamic QR
    payload.push_str(&tlv("26", &merchant_account));
    payload.push_str(&tlv("52", "0000")); // merchant category: not informed
    payload.push_str(&tlv("53", "986")); // currency: BRL
    payload.push_str(&tlv("54", &amount::format_brl(params.amount)));
    payload.push_str(&tlv("58", "BR"));
    payload.push_str(&tlv("59", &name));
    payload.push_str(&tlv("60", &city));
    payload.push_str(&tlv("62", &additional));
    payload.push_str(CRC_PLACEHOLDER);
    let checksum = crc::checksum(&payload);
    payload.push_str(&checksum);
    payload
}

/// Returns the PSP's own payable string verbatim (trimmed) when present,
/// otherwise derives the payload from `params`.
#[must_use]
pub fn encode_or_reuse(psp_payload: Option<&str>, params: &EmvParams<'_>) -> String {
    if let Some(ready) = psp_payload {
        let trimmed = ready.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }
    encode(params)
}

/// Recomputes the CRC over all but the last four characters and compares
/// it against them.
#[must_use]
pub fn validate(payload: &str) -> bool {
    if payload.len() <= 4 || !payload.is_char_boundary(payload.len() - 4) {
        return false;
    }
    let (body, tail) = payload.split_at(payload.len() - 4);
    crc::checksum(body) == tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> EmvParams<'static> {
        EmvParams {
            location: "PSP.example.com/qr/v2/Cobv/9d36b84f",
            amount: dec!(150.00),
            receiver_name: "Usina São João Ltda",
            receiver_city: "Belo Horizonte",
        }
    }

    #[test]
    fn encoded_payload_validates() {
        let payload = encode(&params());
        assert!(validate(&payload), "payload failed validation: {payload}");
    }

    #[test]
    fn payload_starts_with_format_indicator_and_ends_with_crc() {
        let payload = encode(&params());
        assert!(payload.starts_with("000201"));
        let body = &payload[..payload.len() - 4];
        assert!(body.ends_with("6304"));
        assert_eq!(&payload[payload.len() - 4..], crc::checksum(body));
    }

    #[test]
    fn any_single_character_flip_fails_validation() {
        let payload = encode(&params());
        for (i, original) in payload.char_indices() {
            let replacement = if original == 'X' { 'Y' } else { 'X' };
            let mut corrupted = payload.clone();
            corrupted.replace_range(i..i + original.len_utf8(), &replacement.to_string());
            assert!(
                !validate(&corrupted),
                "flip at {i} passed validation: {corrupted}"
            );
        }
    }

    #[test]
    fn tlv_lengths_match_value_byte_lengths() {
        let payload = encode(&params());
        let body = &payload[..payload.len() - 4];
        let mut rest = body;
        while !rest.is_empty() {
            assert!(rest.len() >= 4, "truncated field header in {rest}");
            let len: usize = rest[2..4].parse().expect("numeric length");
            assert!(rest.len() >= 4 + len, "field overruns payload");
            rest = &rest[4 + len..];
        }
    }

    #[test]
    fn location_is_lowercased_and_capped() {
        let payload = encode(&params());
        assert!(payload.contains("psp.example.com/qr/v2/cobv/9d36b84f"));
        assert!(!payload.contains("PSP.example.com"));

        let long = format!("psp.example.com/{}", "a".repeat(100));
        let capped = encode(&EmvParams {
            location: &long,
            ..params()
        });
        assert!(validate(&capped));
        assert!(capped.contains(&long[..LOCATION_MAX_LEN]));
        assert!(!capped.contains(&long[..LOCATION_MAX_LEN + 1]));
    }

    #[test]
    fn receiver_fields_are_sanitized() {
        let payload = encode(&params());
        assert!(payload.contains("USINA SAO JOAO LTDA"));
        assert!(payload.contains("BELO HORIZONTE"));
    }

    #[test]
    fn carries_currency_country_and_reference_label() {
        let payload = encode(&params());
        assert!(payload.contains("5303986"));
        assert!(payload.contains("5802BR"));
        assert!(payload.contains("62070503***"));
        assert!(payload.contains("5406150.00"));
    }

    #[test]
    fn reuses_psp_payable_string_verbatim() {
        let ready = "  000201...PSPBUILT...6304ABCD  ";
        assert_eq!(
            encode_or_reuse(Some(ready), &params()),
            "000201...PSPBUILT...6304ABCD"
        );
        // Blank PSP strings fall through to local encoding.
        let derived = encode_or_reuse(Some("   "), &params());
        assert!(validate(&derived));
        assert_eq!(encode_or_reuse(None, &params()), encode(&params()));
    }

    #[test]
    fn validate_rejects_short_or_empty() {
        assert!(!validate(""));
        assert!(!validate("6304"));
        assert!(!validate("0002"));
    }
}
