//! Phone number normalization to the `+7XXXXXXXXXX` E.164 form

use std::fmt;

use serde::Serialize;

use crate::error::{ProfileError, ProfileResult};

/// A phone number known to be `+7` followed by exactly 10 digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPhone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a Russian phone number.
///
/// All non-digit characters are dropped first, then:
/// - `8` + 10 digits becomes `+7` + the 10 digits
/// - `7` + 10 digits becomes `+7` + the 10 digits
/// - `9` + 9 digits (a bare 10-digit mobile number) gets `+7` prepended
///
/// Anything else is rejected with [`ProfileError::InvalidPhone`].
pub fn normalize_phone(raw: &str) -> ProfileResult<NormalizedPhone> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let national = match (digits.len(), digits.as_bytes().first()) {
        (11, Some(b'8')) | (11, Some(b'7')) => &digits[1..],
        (10, Some(b'9')) => digits.as_str(),
        _ => return Err(ProfileError::InvalidPhone),
    };

    Ok(NormalizedPhone(format!("+7{}", national)))
}

/// Answer to "is this a phone we can resolve?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_phone: Option<NormalizedPhone>,
}

/// Non-failing form of [`normalize_phone`]
pub fn validate_phone(raw: &str) -> PhoneValidation {
    match normalize_phone(raw) {
        Ok(normalized) => PhoneValidation {
            valid: true,
            normalized_phone: Some(normalized),
        },
        Err(_) => PhoneValidation {
            valid: false,
            normalized_phone: None,
        },
    }
}

/// Mask all but the last four digits for logging
pub fn mask_phone(phone: &str) -> String {
    let count = phone.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let visible: String = phone.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone_reports_normalized_form() {
        let ok = validate_phone("+7 (999) 123-45-67");
        assert!(ok.valid);
        assert_eq!(ok.normalized_phone.unwrap().as_str(), "+79991234567");

        let bad = validate_phone("12345");
        assert!(!bad.valid);
        assert_eq!(bad.normalized_phone, None);
    }

    #[test]
    fn test_leading_eight_replaced() {
        assert_eq!(normalize_phone("89991234567").unwrap().as_str(), "+79991234567");
    }

    #[test]
    fn test_bare_mobile_gets_country_code() {
        assert_eq!(normalize_phone("9991234567").unwrap().as_str(), "+79991234567");
    }

    #[test]
    fn test_formatted_plus_seven() {
        assert_eq!(
            normalize_phone("+7 (999) 123-45-67").unwrap().as_str(),
            "+79991234567"
        );
        assert_eq!(normalize_phone("7 999 123 45 67").unwrap().as_str(), "+79991234567");
    }

    #[test]
    fn test_idempotent_on_normalized_input() {
        let once = normalize_phone("8 (912) 000-11-22").unwrap();
        let twice = normalize_phone(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_shape_for_valid_inputs() {
        let inputs = [
            "89001112233",
            "+79001112233",
            "79001112233",
            "9001112233",
            "8-900-111-22-33",
            "  +7 900 111 22 33  ",
        ];
        for input in inputs {
            let phone = normalize_phone(input).unwrap();
            let s = phone.as_str();
            assert_eq!(s.len(), 12, "{}", input);
            assert!(s.starts_with("+7"), "{}", input);
            assert!(s[2..].chars().all(|c| c.is_ascii_digit()), "{}", input);
        }
    }

    #[test]
    fn test_rejects_other_shapes() {
        for input in [
            "",
            "abc",
            "12345",
            "99912345",
            "19991234567",
            "899912345678",
            "8999123456",
            "+1 555 123 4567",
        ] {
            assert!(
                matches!(normalize_phone(input), Err(ProfileError::InvalidPhone)),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+79991234567"), "********4567");
        assert_eq!(mask_phone("123"), "***");
    }
}
