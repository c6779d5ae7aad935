//! ============================================================================
//! Configuration - Tracking limits and backend endpoints
//! ============================================================================
//! Values come from environment variables (a `.env` file is loaded by the
//! binary) and fall back to the production defaults.
//! ============================================================================

use std::time::Duration;

use crate::types::{MAX_DAILY_STEPS, MAX_WALKING_SPEED_KMH, MILESTONE_INTERVAL};

/// Default auto-sync interval (60 seconds)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Default interval between source polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Fixed backoff before the single OTP SDK retry
pub const DEFAULT_OTP_RETRY_BACKOFF_MS: u64 = 800;

/// Limits and timings for the step tracker
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub max_daily_steps: u64,
    pub max_walking_speed_kmh: f64,
    pub milestone_interval: u64,
    pub sync_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_daily_steps: MAX_DAILY_STEPS,
            max_walking_speed_kmh: MAX_WALKING_SPEED_KMH,
            milestone_interval: MILESTONE_INTERVAL,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl TrackerConfig {
    /// Defaults overridden by YOGIC_* environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_daily_steps: env_parse("YOGIC_MAX_DAILY_STEPS").unwrap_or(defaults.max_daily_steps),
            max_walking_speed_kmh: env_parse("YOGIC_MAX_WALKING_SPEED_KMH")
                .unwrap_or(defaults.max_walking_speed_kmh),
            milestone_interval: env_parse::<u64>("YOGIC_MILESTONE_INTERVAL")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.milestone_interval),
            sync_interval: env_parse("YOGIC_SYNC_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_interval),
            poll_interval: env_parse("YOGIC_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

/// Backend-as-a-service endpoints used by sync and OTP delivery
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project base URL, e.g. https://xyz.supabase.co
    pub supabase_url: String,
    pub anon_key: Option<String>,
    /// Remote balance mutation (RPC name)
    pub earn_steps_rpc: String,
    pub send_otp_function: String,
    pub verify_otp_function: String,
    /// Raw HTTP fallback base; defaults to the functions endpoint
    pub otp_fallback_url: Option<String>,
    pub user_agent: String,
    pub otp_retry_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            supabase_url: std::env::var("SUPABASE_URL")
                .unwrap_or_else(|_| "http://localhost:54321".to_string()),
            anon_key: std::env::var("SUPABASE_ANON_KEY").ok(),
            earn_steps_rpc: std::env::var("YOGIC_EARN_STEPS_RPC")
                .unwrap_or_else(|_| "earn_steps".to_string()),
            send_otp_function: std::env::var("YOGIC_SEND_OTP_FUNCTION")
                .unwrap_or_else(|_| "send-otp".to_string()),
            verify_otp_function: std::env::var("YOGIC_VERIFY_OTP_FUNCTION")
                .unwrap_or_else(|_| "verify-otp".to_string()),
            otp_fallback_url: std::env::var("YOGIC_OTP_FALLBACK_URL").ok(),
            user_agent: format!("YogicMile/{} (yogic-core)", env!("CARGO_PKG_VERSION")),
            otp_retry_backoff: Duration::from_millis(DEFAULT_OTP_RETRY_BACKOFF_MS),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl BackendConfig {
    /// URL of an edge function
    pub fn function_url(&self, function: &str) -> String {
        format!(
            "{}/functions/v1/{}",
            self.supabase_url.trim_end_matches('/'),
            function
        )
    }

    /// URL of a database RPC
    pub fn rpc_url(&self, rpc: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.supabase_url.trim_end_matches('/'), rpc)
    }

    /// URL used by the raw HTTP fallback tier
    pub fn fallback_function_url(&self, function: &str) -> String {
        match &self.otp_fallback_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), function),
            None => self.function_url(function),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
