//! Input validation for onboarding fields.
//!
//! Failures are ordinary values carrying the localized reason shown to the
//! user verbatim; they never touch session state.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Letters (Persian or ASCII) and whitespace, 2–30 characters.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[آ-یa-zA-Z\s]{2,30}$").unwrap());

/// Optional leading `+`, then 10–15 digits.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?\d{10,15}$").unwrap());

/// 6–20 ASCII alphanumerics.
static ACCOUNT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]{6,20}$").unwrap());

/// Validate and clean a display name.
pub fn validate_name(input: &str) -> Result<String, ValidationError> {
    let clean = input.trim();
    if clean.is_empty() {
        return Err(ValidationError::new("نام نمی‌تواند خالی باشد"));
    }
    if !NAME_RE.is_match(clean) {
        return Err(ValidationError::new(
            "نام باید بین ۲ تا ۳۰ کاراکتر باشد و فقط شامل حروف باشد",
        ));
    }
    Ok(clean.to_string())
}

/// Validate and normalize a phone number.
///
/// Strips everything except digits and `+` first, so formatted input like
/// `"+98 912 123-4567"` is accepted.
pub fn validate_phone(input: &str) -> Result<String, ValidationError> {
    if input.trim().is_empty() {
        return Err(ValidationError::new("شماره تلفن نمی‌تواند خالی باشد"));
    }

    let clean: String = input
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if !PHONE_RE.is_match(&clean) {
        return Err(ValidationError::new(
            "شماره تلفن معتبر وارد کنید (حداقل ۱۰ رقم)",
        ));
    }
    Ok(clean)
}

/// Validate an external account identifier (already digit-normalized).
pub fn validate_account_id(input: &str) -> Result<String, ValidationError> {
    let clean = input.trim();
    if clean.is_empty() {
        return Err(ValidationError::new("UID نمی‌تواند خالی باشد"));
    }
    if !ACCOUNT_ID_RE.is_match(clean) {
        return Err(ValidationError::new(
            "UID باید بین ۶ تا ۲۰ کاراکتر حرف یا عدد انگلیسی باشد",
        ));
    }
    Ok(clean.to_string())
}

/// Replace Persian digit glyphs with their ASCII equivalents.
pub fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '۰' => '0',
            '۱' => '1',
            '۲' => '2',
            '۳' => '3',
            '۴' => '4',
            '۵' => '5',
            '۶' => '6',
            '۷' => '7',
            '۸' => '8',
            '۹' => '9',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Names ───────────────────────────────────────────────────────

    #[test]
    fn name_accepts_ascii_and_persian() {
        assert_eq!(validate_name("Ali").unwrap(), "Ali");
        assert_eq!(validate_name("  Ali Reza  ").unwrap(), "Ali Reza");
        assert_eq!(validate_name("علی رضا").unwrap(), "علی رضا");
    }

    #[test]
    fn name_rejects_empty_and_whitespace() {
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn name_rejects_too_short_and_too_long() {
        assert!(validate_name("A").is_err());
        assert!(validate_name(&"a".repeat(31)).is_err());
        assert!(validate_name(&"a".repeat(30)).is_ok());
    }

    #[test]
    fn name_rejects_digits_and_punctuation() {
        assert!(validate_name("Ali42").is_err());
        assert!(validate_name("Ali!").is_err());
    }

    #[test]
    fn name_error_carries_localized_reason() {
        let err = validate_name("!").unwrap_err();
        assert!(err.0.contains("نام"));
    }

    // ── Phones ──────────────────────────────────────────────────────

    #[test]
    fn phone_accepts_plain_and_plus_prefixed() {
        assert_eq!(validate_phone("09121234567").unwrap(), "09121234567");
        assert_eq!(validate_phone("+989121234567").unwrap(), "+989121234567");
    }

    #[test]
    fn phone_strips_formatting() {
        assert_eq!(
            validate_phone("+98 (912) 123-4567").unwrap(),
            "+989121234567"
        );
    }

    #[test]
    fn phone_rejects_short_long_and_empty() {
        assert!(validate_phone("").is_err());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone(&"9".repeat(16)).is_err());
        assert!(validate_phone(&"9".repeat(15)).is_ok());
    }

    #[test]
    fn phone_rejects_interior_plus() {
        assert!(validate_phone("+98+9121234567").is_err());
    }

    // ── Account ids ─────────────────────────────────────────────────

    #[test]
    fn account_id_accepts_alphanumerics() {
        assert_eq!(validate_account_id("AB12345").unwrap(), "AB12345");
        assert_eq!(validate_account_id(" 983265275 ").unwrap(), "983265275");
    }

    #[test]
    fn account_id_rejects_bad_lengths_and_symbols() {
        assert!(validate_account_id("12345").is_err());
        assert!(validate_account_id(&"a".repeat(21)).is_err());
        assert!(validate_account_id("abc-123").is_err());
        assert!(validate_account_id("").is_err());
    }

    // ── Digit normalization ─────────────────────────────────────────

    #[test]
    fn persian_digits_become_ascii() {
        assert_eq!(normalize_digits("۹۸۳۲۶۵۲۷۵"), "983265275");
        assert_eq!(normalize_digits("AB۱۲۳۴۵"), "AB12345");
        assert_eq!(normalize_digits("plain123"), "plain123");
    }

    #[test]
    fn normalized_persian_account_id_validates() {
        let normalized = normalize_digits("۹۸۳۲۶۵۲۷۵");
        assert!(validate_account_id(&normalized).is_ok());
    }
}
