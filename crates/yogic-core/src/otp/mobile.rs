//! Mobile number and OTP code checks, run before any network call.

use super::types::OtpError;

/// Normalise common spellings of an Indian mobile number to `+91XXXXXXXXXX`.
/// Returns None when the digits cannot form a valid number.
pub fn format_indian_mobile(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let has_plus = trimmed.starts_with('+');

    let mut digits = String::with_capacity(12);
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            '+' if i == 0 => {}
            _ => return None,
        }
    }

    let national = match digits.len() {
        10 if !has_plus => digits.as_str(),
        11 if !has_plus && digits.starts_with('0') => &digits[1..],
        12 if digits.starts_with("91") => &digits[2..],
        _ => return None,
    };

    let formatted = format!("+91{}", national);
    is_valid_formatted_mobile(&formatted).then_some(formatted)
}

/// Exactly `+91[6-9]\d{9}`
pub fn is_valid_formatted_mobile(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("+91") else {
        return false;
    };
    let bytes = rest.as_bytes();
    bytes.len() == 10
        && matches!(bytes[0], b'6'..=b'9')
        && bytes.iter().all(|b| b.is_ascii_digit())
}

/// OTP codes are exactly six ASCII digits
pub fn validate_otp_code(code: &str) -> Result<&str, OtpError> {
    let code = code.trim();
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(OtpError::InvalidCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_spellings() {
        let expected = Some("+919876543210".to_string());
        assert_eq!(format_indian_mobile("9876543210"), expected);
        assert_eq!(format_indian_mobile("+91 98765 43210"), expected);
        assert_eq!(format_indian_mobile("919876543210"), expected);
        assert_eq!(format_indian_mobile("09876543210"), expected);
        assert_eq!(format_indian_mobile("+91-98765-43210"), expected);
    }

    #[test]
    fn test_rejected_numbers() {
        assert_eq!(format_indian_mobile("12345"), None);
        assert_eq!(format_indian_mobile("5876543210"), None);
        assert_eq!(format_indian_mobile("+19876543210"), None);
        assert_eq!(format_indian_mobile("98765abc10"), None);
        assert_eq!(format_indian_mobile("+9876543210"), None);
        assert_eq!(format_indian_mobile(""), None);
        // '+' only allowed as the very first character
        assert_eq!(format_indian_mobile("(+91) 98765-43210"), None);
    }

    #[test]
    fn test_formatted_pattern() {
        assert!(is_valid_formatted_mobile("+916000000000"));
        assert!(!is_valid_formatted_mobile("+915999999999"));
        assert!(!is_valid_formatted_mobile("+91987654321"));
        assert!(!is_valid_formatted_mobile("919876543210"));
    }

    #[test]
    fn test_otp_code() {
        assert_eq!(validate_otp_code(" 123456 ").unwrap(), "123456");
        assert_eq!(validate_otp_code("12345"), Err(OtpError::InvalidCode));
        assert_eq!(validate_otp_code("12a456"), Err(OtpError::InvalidCode));
        assert_eq!(validate_otp_code("١٢٣٤٥٦"), Err(OtpError::InvalidCode));
    }
}
