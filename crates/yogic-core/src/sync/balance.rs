//! ============================================================================
//! Balance Mutation - Remote step credit
//! ============================================================================
//! The backend credits the wallet (25 steps : 1 paisa, phase multiplier).
//! That logic is opaque here; a thrown error and `{success: false}` are
//! treated the same way: nothing was credited.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::session::UserSession;
use super::SyncError;
use crate::config::BackendConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarnStepsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "coinsEarned", alias = "paisa_earned")]
    pub coins_earned: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Remote call that converts pending steps into wallet balance
#[async_trait]
pub trait BalanceMutation: Send + Sync {
    async fn earn_steps(
        &self,
        session: &UserSession,
        steps: u64,
    ) -> Result<EarnStepsResponse, SyncError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EarnStepsRequest<'a> {
    user_id: &'a str,
    pending_steps: u64,
}

/// `earn_steps` RPC over the Supabase REST endpoint
pub struct SupabaseBalanceClient {
    client: reqwest::Client,
    config: BackendConfig,
}

impl SupabaseBalanceClient {
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }
}

#[async_trait]
impl BalanceMutation for SupabaseBalanceClient {
    async fn earn_steps(
        &self,
        session: &UserSession,
        steps: u64,
    ) -> Result<EarnStepsResponse, SyncError> {
        let url = self.config.rpc_url(&self.config.earn_steps_rpc);
        debug!("Calling {} for {} steps", url, steps);

        let mut request = self.client.post(&url).json(&EarnStepsRequest {
            user_id: &session.user_id,
            pending_steps: steps,
        });

        if let Some(key) = &self.config.anon_key {
            request = request.header("apikey", key);
        }
        if let Some(token) = session.access_token.as_ref().or(self.config.anon_key.as_ref()) {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = parse_earn_response(&body)?;
        info!(
            "earn_steps answered success={} coins={:?}",
            parsed.success, parsed.coins_earned
        );
        Ok(parsed)
    }
}

/// RPCs may answer with an object or a single-row array
fn parse_earn_response(body: &str) -> Result<EarnStepsResponse, SyncError> {
    if body.trim().is_empty() {
        return Err(SyncError::InvalidResponse("empty body".to_string()));
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

    let object = match value {
        serde_json::Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
        other => other,
    };

    serde_json::from_value(object).map_err(|e| SyncError::InvalidResponse(e.to_string()))
}
