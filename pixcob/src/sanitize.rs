//! Text sanitizers for EMV fields and txid fragments.
//!
//! PIX wallets and the Bacen charge API only accept a restricted character
//! set in merchant names, cities and transaction identifiers. These helpers
//! fold Portuguese diacritics to their ASCII base letters and drop anything
//! outside the accepted set.

/// Folds Latin diacritics commonly found in Brazilian names to their ASCII
/// base letters. Characters without a mapping pass through unchanged.
#[must_use]
pub fn strip_diacritics(input: &str) -> String {
    input.chars().map(fold_char).collect()
}

/// Uppercases, de-accents and keeps only ASCII alphanumerics.
#[must_use]
pub fn alphanumeric_upper(input: &str) -> String {
    strip_diacritics(input)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_uppercase()
}

/// Uppercases, de-accents and keeps ASCII alphanumerics plus single spaces,
/// truncated to `max_len` bytes. Used for EMV receiver name and city.
#[must_use]
pub fn emv_text(input: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(max_len);
    for c in strip_diacritics(input.trim()).chars() {
        if c.is_ascii_alphanumeric() || c == ' ' {
            for u in c.to_uppercase() {
                out.push(u);
            }
        }
        if out.len() >= max_len {
            break;
        }
    }
    out.truncate(max_len);
    out.trim_end().to_owned()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_portuguese_diacritics() {
        assert_eq!(strip_diacritics("João Conceição"), "Joao Conceicao");
        assert_eq!(strip_diacritics("ANDRÉ"), "ANDRE");
    }

    #[test]
    fn alphanumeric_upper_drops_punctuation() {
        assert_eq!(alphanumeric_upper("José-Maria 2ª"), "JOSEMARIA2");
    }

    #[test]
    fn emv_text_keeps_spaces_and_truncates() {
        assert_eq!(emv_text("Cooperativa Solar Ltda.", 15), "COOPERATIVA SOL");
        assert_eq!(emv_text("  São Paulo  ", 15), "SAO PAULO");
    }

    #[test]
    fn emv_text_never_ends_with_space() {
        // Truncation landing on a space must not leave a trailing blank.
        assert_eq!(emv_text("ABC DEFGH", 4), "ABC");
    }
}
