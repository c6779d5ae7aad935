//! ============================================================================
//! OTP Tiers - HTTP transports for the OTP edge functions
//! ============================================================================
//! - SdkInvokeTier: functions endpoint with client SDK headers
//! - RawHttpTier: plain POST to the (optionally overridden) function URL
//! Both send the same payload and share response parsing.
//! ============================================================================

use async_trait::async_trait;
use tracing::debug;

use super::types::{OtpAction, OtpPayload, OtpResponse, OtpTier, TierFailure};
use crate::config::BackendConfig;

const CLIENT_INFO: &str = concat!("yogic-core/", env!("CARGO_PKG_VERSION"));

fn function_name(config: &BackendConfig, action: OtpAction) -> &str {
    match action {
        OtpAction::Send => &config.send_otp_function,
        OtpAction::Verify => &config.verify_otp_function,
    }
}

/// Edge function call as the client SDK makes it
pub struct SdkInvokeTier {
    client: reqwest::Client,
    config: BackendConfig,
}

impl SdkInvokeTier {
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }
}

#[async_trait]
impl OtpTier for SdkInvokeTier {
    async fn call(&self, action: OtpAction, payload: &OtpPayload) -> Result<OtpResponse, TierFailure> {
        let url = self.config.function_url(function_name(&self.config, action));
        debug!("SDK invoke: POST {}", url);

        let mut request = self
            .client
            .post(&url)
            .header("x-client-info", CLIENT_INFO)
            .json(payload);

        if let Some(key) = &self.config.anon_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TierFailure::NoResponse(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TierFailure::NoResponse(e.to_string()))?;

        parse_function_body(status, &body)
    }
}

/// Direct HTTP request, bypassing the SDK wrapper
pub struct RawHttpTier {
    client: reqwest::Client,
    config: BackendConfig,
}

impl RawHttpTier {
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }
}

#[async_trait]
impl OtpTier for RawHttpTier {
    async fn call(&self, action: OtpAction, payload: &OtpPayload) -> Result<OtpResponse, TierFailure> {
        let url = self
            .config
            .fallback_function_url(function_name(&self.config, action));
        debug!("Raw HTTP fallback: POST {}", url);

        let body = serde_json::to_vec(payload).map_err(|e| TierFailure::Server {
            status: None,
            code: Some("UNEXPECTED_ERROR".to_string()),
            message: Some(e.to_string()),
            request_id: None,
            attempts_remaining: None,
        })?;

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body);

        if let Some(key) = &self.config.anon_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TierFailure::NoResponse(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TierFailure::NoResponse(e.to_string()))?;

        parse_function_body(status, &String::from_utf8_lossy(&bytes))
    }
}

/// Non-2xx answers become server failures carrying whatever code the body
/// had. A 2xx answer is returned as-is; the caller checks `success`.
fn parse_function_body(status: u16, body: &str) -> Result<OtpResponse, TierFailure> {
    if body.trim().is_empty() {
        return Err(TierFailure::EmptyBody);
    }

    let response: OtpResponse = serde_json::from_str(body).map_err(|_| TierFailure::InvalidJson)?;

    if (200..300).contains(&status) {
        Ok(response)
    } else {
        Err(TierFailure::from_response(Some(status), response))
    }
}
