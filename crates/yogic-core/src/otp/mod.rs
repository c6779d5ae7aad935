//! ============================================================================
//! OTP Module - One-time password delivery with tiered fallback
//! ============================================================================
//! Requests an OTP for an Indian mobile number through an ordered list of
//! transport strategies:
//!
//! 1. **SDK invoke**: functions endpoint with the client SDK headers
//! 2. **SDK retry**: same call once more after 800ms, only when the first
//!    answer was unreadable (`INVALID_JSON`, `EMPTY_BODY`, no response)
//! 3. **Raw HTTP**: direct POST with manual response parsing
//!
//! Server error codes are translated to user-facing categories. Input is
//! validated before any network call.
//!
//! ## Usage
//! ```rust,ignore
//! use yogic_core::otp::OtpTransport;
//!
//! let transport = OtpTransport::from_config(&backend_config);
//! let delivery = transport.request_otp("98765 43210").await?;
//! ```
//! ============================================================================

mod errors;
mod mobile;
mod tiers;
mod transport;
mod types;

pub use errors::{translate_error_code, OtpErrorCategory, TranslatedOtpError};
pub use mobile::{format_indian_mobile, is_valid_formatted_mobile, validate_otp_code};
pub use tiers::{RawHttpTier, SdkInvokeTier};
pub use transport::{OtpTransport, TierCondition, TierStrategy};
pub use types::{
    OtpAction, OtpDelivery, OtpError, OtpPayload, OtpRequestAttempt, OtpResponse, OtpTier,
    OtpTierKind, TierFailure,
};
