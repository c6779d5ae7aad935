//! Server error code → user-facing message table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpErrorCategory {
    RateLimit,
    DailyLimit,
    BlockedAccount,
    ConfigMissing,
    Validation,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedOtpError {
    pub code: String,
    pub category: OtpErrorCategory,
    pub message: String,
    pub allow_proceed_to_otp: bool,
}

/// Map a backend error code onto a category and message.
/// `INVALID_JSON` and `UNEXPECTED_ERROR` let the user continue to OTP entry
/// even though delivery was not confirmed.
pub fn translate_error_code(code: &str) -> TranslatedOtpError {
    let normalized = code.trim().to_uppercase();

    let (category, message, allow_proceed_to_otp) = match normalized.as_str() {
        "RATE_LIMITED" | "RATE_LIMIT_EXCEEDED" | "TOO_MANY_REQUESTS" | "HTTP_429" => (
            OtpErrorCategory::RateLimit,
            "Too many OTP requests. Please wait a few minutes and try again.",
            false,
        ),
        "DAILY_LIMIT_EXCEEDED" | "DAILY_LIMIT_REACHED" => (
            OtpErrorCategory::DailyLimit,
            "You've reached today's OTP limit. Please try again tomorrow.",
            false,
        ),
        "ACCOUNT_BLOCKED" | "NUMBER_BLOCKED" | "BLOCKED" => (
            OtpErrorCategory::BlockedAccount,
            "This number has been blocked. Please contact support.",
            false,
        ),
        "CONFIG_MISSING" | "MISSING_CONFIG" | "SMS_PROVIDER_NOT_CONFIGURED" => (
            OtpErrorCategory::ConfigMissing,
            "OTP service is temporarily unavailable. Please try again later.",
            false,
        ),
        "VALIDATION_ERROR" | "INVALID_MOBILE" | "INVALID_FORMAT" | "INVALID_OTP" | "OTP_EXPIRED" => (
            OtpErrorCategory::Validation,
            "Please check the number or code you entered and try again.",
            false,
        ),
        "INVALID_JSON" | "UNEXPECTED_ERROR" => (
            OtpErrorCategory::Unexpected,
            "We couldn't confirm the OTP was sent. If you receive it, enter it below.",
            true,
        ),
        _ => (
            OtpErrorCategory::Unexpected,
            "Something went wrong while sending the OTP. Please try again.",
            false,
        ),
    };

    TranslatedOtpError {
        code: normalized,
        category,
        message: message.to_string(),
        allow_proceed_to_otp,
    }
}
