//! ============================================================================
//! OTP Transport - Ordered strategy pipeline
//! ============================================================================
//! VALIDATE → SDK invoke → (unreadable answer) wait + SDK retry → raw HTTP.
//! The first `success: true` ends the request; otherwise the last failure is
//! translated and returned. No tier runs after the request has failed.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::translate_error_code;
use super::mobile::{format_indian_mobile, validate_otp_code};
use super::tiers::{RawHttpTier, SdkInvokeTier};
use super::types::{
    OtpAction, OtpDelivery, OtpError, OtpPayload, OtpRequestAttempt, OtpTier, OtpTierKind,
    TierFailure,
};
use crate::config::BackendConfig;

/// When a strategy is eligible to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierCondition {
    /// Whenever nothing has succeeded yet
    Always,
    /// Only if the previous tier's answer was unreadable or missing
    OnTransientFailure,
}

#[derive(Clone)]
pub struct TierStrategy {
    pub kind: OtpTierKind,
    pub tier: Arc<dyn OtpTier>,
    /// Wait before calling this tier
    pub delay: Duration,
    pub condition: TierCondition,
}

pub struct OtpTransport {
    strategies: Vec<TierStrategy>,
    user_agent: String,
}

impl OtpTransport {
    /// Standard three-tier chain: SDK, one delayed SDK retry, raw HTTP
    pub fn new(
        sdk: Arc<dyn OtpTier>,
        raw: Arc<dyn OtpTier>,
        retry_backoff: Duration,
        user_agent: String,
    ) -> Self {
        let strategies = vec![
            TierStrategy {
                kind: OtpTierKind::SdkInvoke,
                tier: Arc::clone(&sdk),
                delay: Duration::ZERO,
                condition: TierCondition::Always,
            },
            TierStrategy {
                kind: OtpTierKind::SdkInvokeRetry,
                tier: sdk,
                delay: retry_backoff,
                condition: TierCondition::OnTransientFailure,
            },
            TierStrategy {
                kind: OtpTierKind::RawHttpFallback,
                tier: raw,
                delay: Duration::ZERO,
                condition: TierCondition::Always,
            },
        ];
        Self::with_strategies(strategies, user_agent)
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            Arc::new(SdkInvokeTier::new(config.clone())),
            Arc::new(RawHttpTier::new(config.clone())),
            config.otp_retry_backoff,
            config.user_agent.clone(),
        )
    }

    pub fn with_strategies(strategies: Vec<TierStrategy>, user_agent: String) -> Self {
        Self {
            strategies,
            user_agent,
        }
    }

    /// Ask the backend to send an OTP to `mobile`
    pub async fn request_otp(&self, mobile: &str) -> Result<OtpDelivery, OtpError> {
        let formatted = format_indian_mobile(mobile)
            .ok_or_else(|| OtpError::InvalidFormat(mobile.to_string()))?;

        let payload = OtpPayload {
            mobile_number: formatted,
            user_agent: self.user_agent.clone(),
            otp: None,
        };
        self.run(OtpAction::Send, payload).await
    }

    /// Check a code the user typed
    pub async fn verify_otp(&self, mobile: &str, code: &str) -> Result<OtpDelivery, OtpError> {
        let formatted = format_indian_mobile(mobile)
            .ok_or_else(|| OtpError::InvalidFormat(mobile.to_string()))?;
        let code = validate_otp_code(code)?;

        let payload = OtpPayload {
            mobile_number: formatted,
            user_agent: self.user_agent.clone(),
            otp: Some(code.to_string()),
        };
        self.run(OtpAction::Verify, payload).await
    }

    async fn run(&self, action: OtpAction, payload: OtpPayload) -> Result<OtpDelivery, OtpError> {
        let client_request_id = Uuid::new_v4().to_string();
        let mut attempts: Vec<OtpRequestAttempt> = Vec::new();
        let mut last_failure: Option<TierFailure> = None;

        for strategy in &self.strategies {
            let eligible = match strategy.condition {
                TierCondition::Always => true,
                TierCondition::OnTransientFailure => {
                    last_failure.as_ref().is_some_and(TierFailure::is_transient)
                }
            };
            if !eligible {
                debug!("[{}] Skipping {:?}", client_request_id, strategy.kind);
                continue;
            }

            if !strategy.delay.is_zero() {
                debug!(
                    "[{}] Waiting {:?} before {:?}",
                    client_request_id, strategy.delay, strategy.kind
                );
                tokio::time::sleep(strategy.delay).await;
            }

            info!(
                "[{}] OTP {:?} via {:?}",
                client_request_id, action, strategy.kind
            );

            let failure = match strategy.tier.call(action, &payload).await {
                Ok(response) if response.success => {
                    attempts.push(OtpRequestAttempt {
                        client_request_id: client_request_id.clone(),
                        mobile_number_formatted: payload.mobile_number.clone(),
                        transport_tier: strategy.kind,
                        server_error_code: None,
                        server_request_id: response.req_id.clone(),
                        succeeded: true,
                    });
                    info!(
                        "[{}] OTP {:?} succeeded via {:?} (reqId: {:?})",
                        client_request_id, action, strategy.kind, response.req_id
                    );
                    return Ok(OtpDelivery {
                        client_request_id,
                        req_id: response.req_id,
                        tier: strategy.kind,
                        attempts,
                    });
                }
                Ok(response) => TierFailure::from_response(None, response),
                Err(failure) => failure,
            };

            warn!(
                "[{}] {:?} failed ({}): {}",
                client_request_id,
                strategy.kind,
                failure.code(),
                failure
            );
            attempts.push(OtpRequestAttempt {
                client_request_id: client_request_id.clone(),
                mobile_number_formatted: payload.mobile_number.clone(),
                transport_tier: strategy.kind,
                server_error_code: Some(failure.code()),
                server_request_id: failure.request_id().map(str::to_string),
                succeeded: false,
            });
            last_failure = Some(failure);
        }

        let failure = last_failure
            .unwrap_or_else(|| TierFailure::NoResponse("no transport tiers configured".to_string()));
        let translated = translate_error_code(&failure.code());

        warn!(
            "[{}] OTP {:?} failed after {} attempt(s): {:?}",
            client_request_id,
            action,
            attempts.len(),
            translated.category
        );

        Err(OtpError::Failed {
            code: translated.code,
            category: translated.category,
            message: translated.message,
            allow_proceed_to_otp: translated.allow_proceed_to_otp,
            server_request_id: failure.request_id().map(str::to_string),
            attempts_remaining: failure.attempts_remaining(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::{OtpErrorCategory, OtpResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Replays scripted answers and records what it was sent
    struct ScriptedTier {
        script: Mutex<VecDeque<Result<OtpResponse, TierFailure>>>,
        seen: Mutex<Vec<(OtpAction, OtpPayload)>>,
    }

    impl ScriptedTier {
        fn new(script: Vec<Result<OtpResponse, TierFailure>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OtpTier for ScriptedTier {
        async fn call(&self, action: OtpAction, payload: &OtpPayload) -> Result<OtpResponse, TierFailure> {
            self.seen.lock().unwrap().push((action, payload.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TierFailure::NoResponse("script exhausted".into())))
        }
    }

    fn ok(req_id: &str) -> Result<OtpResponse, TierFailure> {
        Ok(OtpResponse {
            success: true,
            req_id: Some(req_id.to_string()),
            ..OtpResponse::default()
        })
    }

    fn server(code: &str) -> Result<OtpResponse, TierFailure> {
        Err(TierFailure::Server {
            status: Some(400),
            code: Some(code.to_string()),
            message: Some("nope".to_string()),
            request_id: Some("srv-9".to_string()),
            attempts_remaining: Some(1),
        })
    }

    fn transport(sdk: &Arc<ScriptedTier>, raw: &Arc<ScriptedTier>, backoff_ms: u64) -> OtpTransport {
        OtpTransport::new(
            sdk.clone(),
            raw.clone(),
            Duration::from_millis(backoff_ms),
            "YogicMile/test".to_string(),
        )
    }

    #[tokio::test]
    async fn test_full_fallback_chain() {
        let sdk = ScriptedTier::new(vec![
            Err(TierFailure::InvalidJson),
            Err(TierFailure::NoResponse("reset by peer".into())),
        ]);
        let raw = ScriptedTier::new(vec![ok("abc123")]);
        let transport = transport(&sdk, &raw, 800);

        let started = Instant::now();
        let delivery = transport.request_otp("9876543210").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(750));
        assert_eq!(delivery.req_id.as_deref(), Some("abc123"));
        assert_eq!(delivery.tier, OtpTierKind::RawHttpFallback);
        assert_eq!(delivery.failed_attempts().count(), 2);

        let tiers: Vec<_> = delivery.attempts.iter().map(|a| a.transport_tier).collect();
        assert_eq!(
            tiers,
            vec![
                OtpTierKind::SdkInvoke,
                OtpTierKind::SdkInvokeRetry,
                OtpTierKind::RawHttpFallback
            ]
        );
        assert!(delivery
            .attempts
            .iter()
            .all(|a| a.client_request_id == delivery.client_request_id));

        // Every tier saw the same body
        let mut bodies: Vec<OtpPayload> = sdk.seen.lock().unwrap().iter().map(|(_, p)| p.clone()).collect();
        bodies.extend(raw.seen.lock().unwrap().iter().map(|(_, p)| p.clone()));
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|p| p.mobile_number == "+919876543210"
            && p.user_agent == "YogicMile/test"
            && p.otp.is_none()));
    }

    #[tokio::test]
    async fn test_invalid_format_never_reaches_network() {
        let sdk = ScriptedTier::new(vec![ok("never")]);
        let raw = ScriptedTier::new(vec![ok("never")]);
        let transport = transport(&sdk, &raw, 800);

        let err = transport.request_otp("12345").await.unwrap_err();
        assert_eq!(err, OtpError::InvalidFormat("12345".to_string()));
        assert!(err.is_validation());
        assert_eq!(sdk.calls() + raw.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_tier_success_stops_chain() {
        let sdk = ScriptedTier::new(vec![ok("first")]);
        let raw = ScriptedTier::new(vec![ok("unused")]);
        let transport = transport(&sdk, &raw, 800);

        let delivery = transport.request_otp("+91 70000 00001").await.unwrap();
        assert_eq!(delivery.tier, OtpTierKind::SdkInvoke);
        assert_eq!(delivery.attempts.len(), 1);
        assert_eq!(raw.calls(), 0);
    }

    #[tokio::test]
    async fn test_business_error_skips_retry() {
        let sdk = ScriptedTier::new(vec![server("RATE_LIMITED"), ok("should not retry")]);
        let raw = ScriptedTier::new(vec![server("RATE_LIMITED")]);
        let transport = transport(&sdk, &raw, 800);

        let started = Instant::now();
        let err = transport.request_otp("9876543210").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(sdk.calls(), 1);
        assert_eq!(raw.calls(), 1);

        match err {
            OtpError::Failed {
                code,
                category,
                allow_proceed_to_otp,
                server_request_id,
                attempts_remaining,
                attempts,
                ..
            } => {
                assert_eq!(code, "RATE_LIMITED");
                assert_eq!(category, OtpErrorCategory::RateLimit);
                assert!(!allow_proceed_to_otp);
                assert_eq!(server_request_id.as_deref(), Some("srv-9"));
                assert_eq!(attempts_remaining, Some(1));
                assert_eq!(attempts.len(), 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_success_skips_raw_tier() {
        let sdk = ScriptedTier::new(vec![Err(TierFailure::EmptyBody), ok("second")]);
        let raw = ScriptedTier::new(vec![ok("unused")]);
        let transport = transport(&sdk, &raw, 10);

        let delivery = transport.request_otp("9876543210").await.unwrap();
        assert_eq!(delivery.tier, OtpTierKind::SdkInvokeRetry);
        assert_eq!(delivery.req_id.as_deref(), Some("second"));
        assert_eq!(raw.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_success_flag_is_failure() {
        let sdk = ScriptedTier::new(vec![Ok(OtpResponse::default())]);
        let raw = ScriptedTier::new(vec![Ok(OtpResponse {
            req_id: Some("maybe".into()),
            ..OtpResponse::default()
        })]);
        let transport = transport(&sdk, &raw, 10);

        let err = transport.request_otp("9876543210").await.unwrap_err();
        assert_eq!(sdk.calls(), 1);
        assert_eq!(raw.calls(), 1);
        assert!(matches!(&err, OtpError::Failed { code, .. } if code == "UNEXPECTED_ERROR"));
        assert!(err.allow_proceed_to_otp());
    }

    #[tokio::test]
    async fn test_unreadable_everywhere_allows_proceeding() {
        let sdk = ScriptedTier::new(vec![Err(TierFailure::InvalidJson), Err(TierFailure::InvalidJson)]);
        let raw = ScriptedTier::new(vec![Err(TierFailure::InvalidJson)]);
        let transport = transport(&sdk, &raw, 10);

        let err = transport.request_otp("9876543210").await.unwrap_err();
        assert!(err.allow_proceed_to_otp());
        match err {
            OtpError::Failed { attempts, category, .. } => {
                assert_eq!(attempts.len(), 3);
                assert_eq!(category, OtpErrorCategory::Unexpected);
                assert!(attempts.iter().all(|a| !a.succeeded));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_validates_code_first() {
        let sdk = ScriptedTier::new(vec![ok("verified")]);
        let raw = ScriptedTier::new(vec![]);
        let transport = transport(&sdk, &raw, 10);

        assert_eq!(
            transport.verify_otp("9876543210", "12ab56").await.unwrap_err(),
            OtpError::InvalidCode
        );
        assert_eq!(sdk.calls(), 0);

        let delivery = transport.verify_otp("9876543210", "123456").await.unwrap();
        assert_eq!(delivery.req_id.as_deref(), Some("verified"));

        let seen = sdk.seen.lock().unwrap();
        assert_eq!(seen[0].0, OtpAction::Verify);
        assert_eq!(seen[0].1.otp.as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn test_empty_strategy_list_fails_cleanly() {
        let transport = OtpTransport::with_strategies(Vec::new(), "ua".into());
        let err = transport.request_otp("9876543210").await.unwrap_err();
        assert!(matches!(err, OtpError::Failed { ref code, .. } if code == "NO_RESPONSE"));
    }
}
