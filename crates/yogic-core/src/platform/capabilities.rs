//! ============================================================================
//! Capabilities - Traits for platform plugins
//! ============================================================================

use async_trait::async_trait;

use crate::types::SpeedSample;

/// Failure reported by a platform plugin
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Plugin call failed: {0}")]
    Failed(String),
}

/// Background step counter service. Reports steps since the last call.
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn take_steps(&self) -> Result<u64, CapabilityError>;
}

/// Platform health API. `Ok(None)` means no data for today.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn steps_today(&self) -> Result<Option<u64>, CapabilityError>;
}

/// Linked wearable platform. `Ok(None)` means not linked.
#[async_trait]
pub trait ThirdPartySource: Send + Sync {
    async fn steps_today(&self) -> Result<Option<u64>, CapabilityError>;
}

#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn speed_sample(&self) -> Result<Option<SpeedSample>, CapabilityError>;
}

/// Haptics and local notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn haptic(&self) -> Result<(), CapabilityError>;
    async fn notify(&self, title: &str, body: &str) -> Result<(), CapabilityError>;
}

/// Notifier that does nothing, for headless hosts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn haptic(&self) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn notify(&self, _title: &str, _body: &str) -> Result<(), CapabilityError> {
        Ok(())
    }
}
