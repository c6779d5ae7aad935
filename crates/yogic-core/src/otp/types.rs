//! ============================================================================
//! OTP Types - Payloads, responses, attempts and errors
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::OtpErrorCategory;

/// Transport tier, for logging and correlation only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpTierKind {
    SdkInvoke,
    SdkInvokeRetry,
    RawHttpFallback,
}

/// Which edge function a request goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpAction {
    Send,
    Verify,
}

/// Body sent by every tier. Tiers never alter it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpPayload {
    pub mobile_number: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub otp: Option<String>,
}

/// Function response; `success` must be literally true
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtpResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "reqId", alias = "req_id", alias = "requestId")]
    pub req_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts_remaining: Option<u32>,
}

/// Why one tier did not succeed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TierFailure {
    #[error("Response was not valid JSON")]
    InvalidJson,

    #[error("Response body was empty")]
    EmptyBody,

    #[error("No response: {0}")]
    NoResponse(String),

    #[error("Server error {}", describe_server(.code, .message))]
    Server {
        status: Option<u16>,
        code: Option<String>,
        message: Option<String>,
        request_id: Option<String>,
        attempts_remaining: Option<u32>,
    },
}

fn describe_server(code: &Option<String>, message: &Option<String>) -> String {
    format!(
        "{}: {}",
        code.as_deref().unwrap_or("UNKNOWN"),
        message.as_deref().unwrap_or("no message")
    )
}

impl TierFailure {
    /// Server-side failure built from a response without `success: true`
    pub fn from_response(status: Option<u16>, response: OtpResponse) -> Self {
        Self::Server {
            status,
            code: response.code,
            message: response.error,
            request_id: response.req_id,
            attempts_remaining: response.attempts_remaining,
        }
    }

    /// Error code used for translation and logs
    pub fn code(&self) -> String {
        match self {
            Self::InvalidJson => "INVALID_JSON".to_string(),
            Self::EmptyBody => "EMPTY_BODY".to_string(),
            Self::NoResponse(_) => "NO_RESPONSE".to_string(),
            Self::Server { code: Some(code), .. } => code.clone(),
            Self::Server { status: Some(status), .. } => format!("HTTP_{}", status),
            Self::Server { .. } => "UNEXPECTED_ERROR".to_string(),
        }
    }

    /// Unreadable answer: worth one more SDK call
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidJson | Self::EmptyBody | Self::NoResponse(_) => true,
            Self::Server { code: Some(code), .. } => code == "INVALID_JSON" || code == "EMPTY_BODY",
            Self::Server { .. } => false,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Server { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    pub fn attempts_remaining(&self) -> Option<u32> {
        match self {
            Self::Server {
                attempts_remaining, ..
            } => *attempts_remaining,
            _ => None,
        }
    }
}

/// One transport strategy
#[async_trait]
pub trait OtpTier: Send + Sync {
    async fn call(&self, action: OtpAction, payload: &OtpPayload) -> Result<OtpResponse, TierFailure>;
}

/// Record of one tier attempt within a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpRequestAttempt {
    pub client_request_id: String,
    pub mobile_number_formatted: String,
    pub transport_tier: OtpTierKind,
    pub server_error_code: Option<String>,
    pub server_request_id: Option<String>,
    pub succeeded: bool,
}

/// Successful delivery (or verification)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpDelivery {
    pub client_request_id: String,
    pub req_id: Option<String>,
    pub tier: OtpTierKind,
    /// Every attempt in order, the successful one last
    pub attempts: Vec<OtpRequestAttempt>,
}

impl OtpDelivery {
    pub fn failed_attempts(&self) -> impl Iterator<Item = &OtpRequestAttempt> {
        self.attempts.iter().filter(|a| !a.succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OtpError {
    #[error("Please enter a valid 10-digit Indian mobile number")]
    InvalidFormat(String),

    #[error("OTP must be 6 digits")]
    InvalidCode,

    #[error("{message}")]
    Failed {
        code: String,
        category: OtpErrorCategory,
        message: String,
        /// Caller may still show the OTP entry screen
        allow_proceed_to_otp: bool,
        server_request_id: Option<String>,
        attempts_remaining: Option<u32>,
        attempts: Vec<OtpRequestAttempt>,
    },
}

impl OtpError {
    pub fn allow_proceed_to_otp(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                allow_proceed_to_otp: true,
                ..
            }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidFormat(_) | Self::InvalidCode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let payload = OtpPayload {
            mobile_number: "+919876543210".into(),
            user_agent: "YogicMile/1.0".into(),
            otp: None,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"mobileNumber": "+919876543210", "userAgent": "YogicMile/1.0"})
        );
    }

    #[test]
    fn test_response_parsing() {
        let response: OtpResponse = serde_json::from_str(
            r#"{"success": false, "code": "RATE_LIMITED", "error": "slow down", "attempts_remaining": 2}"#,
        )
        .unwrap();
        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("RATE_LIMITED"));
        assert_eq!(response.attempts_remaining, Some(2));

        let response: OtpResponse = serde_json::from_str(r#"{"success": true, "reqId": "abc"}"#).unwrap();
        assert_eq!(response.req_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_failure_codes_and_transience() {
        assert_eq!(TierFailure::InvalidJson.code(), "INVALID_JSON");
        assert!(TierFailure::InvalidJson.is_transient());
        assert!(TierFailure::EmptyBody.is_transient());
        assert!(TierFailure::NoResponse("timeout".into()).is_transient());

        let rate_limited = TierFailure::Server {
            status: Some(429),
            code: Some("RATE_LIMITED".into()),
            message: None,
            request_id: Some("srv-1".into()),
            attempts_remaining: Some(0),
        };
        assert!(!rate_limited.is_transient());
        assert_eq!(rate_limited.code(), "RATE_LIMITED");
        assert_eq!(rate_limited.request_id(), Some("srv-1"));

        let server_json = TierFailure::from_response(
            Some(400),
            OtpResponse {
                code: Some("INVALID_JSON".into()),
                ..OtpResponse::default()
            },
        );
        assert!(server_json.is_transient());

        let bare = TierFailure::from_response(Some(502), OtpResponse::default());
        assert_eq!(bare.code(), "HTTP_502");
    }
}
