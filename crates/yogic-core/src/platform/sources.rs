//! ============================================================================
//! Source Set - Platform-specific capability selection
//! ============================================================================
//! The host registers whatever plugins it has; the platform decides which of
//! them are usable. Call sites then only check for presence.
//! ============================================================================

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::ParseNameError;

use super::capabilities::{HealthSource, LocationSource, SensorSource, ThirdPartySource};

/// Host platform the tracker runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
}

impl Platform {
    /// Platform of the current build target
    pub fn detect() -> Self {
        if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else {
            Self::Web
        }
    }

    /// Background step service (foreground service on Android only)
    pub fn supports_sensor(&self) -> bool {
        matches!(self, Self::Android)
    }

    /// Health Connect on Android, HealthKit on iOS
    pub fn supports_health_api(&self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

impl FromStr for Platform {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            "web" => Ok(Self::Web),
            _ => Err(ParseNameError {
                kind: "platform",
                value: s.to_string(),
            }),
        }
    }
}

/// Plugins offered by the host before platform filtering
#[derive(Default, Clone)]
pub struct PlatformSources {
    pub sensor: Option<Arc<dyn SensorSource>>,
    pub health: Option<Arc<dyn HealthSource>>,
    pub third_party: Option<Arc<dyn ThirdPartySource>>,
    pub location: Option<Arc<dyn LocationSource>>,
}

/// Capabilities usable on this platform
#[derive(Default, Clone)]
pub struct SourceSet {
    pub sensor: Option<Arc<dyn SensorSource>>,
    pub health: Option<Arc<dyn HealthSource>>,
    pub third_party: Option<Arc<dyn ThirdPartySource>>,
    pub location: Option<Arc<dyn LocationSource>>,
}

impl SourceSet {
    /// Select the usable sources once at startup
    pub fn for_platform(platform: Platform, offered: PlatformSources) -> Self {
        let sensor = offered.sensor.filter(|_| platform.supports_sensor());
        let health = offered.health.filter(|_| platform.supports_health_api());

        let set = Self {
            sensor,
            health,
            third_party: offered.third_party,
            location: offered.location,
        };

        info!(
            "Step sources for {:?}: sensor={} health={} third_party={} location={}",
            platform,
            set.sensor.is_some(),
            set.health.is_some(),
            set.third_party.is_some(),
            set.location.is_some()
        );
        set
    }

    /// A set with nothing registered
    pub fn empty() -> Self {
        debug!("Using empty source set");
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sensor.is_none()
            && self.health.is_none()
            && self.third_party.is_none()
            && self.location.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::CapabilityError;
    use async_trait::async_trait;

    struct FixedHealth;

    #[async_trait]
    impl HealthSource for FixedHealth {
        async fn steps_today(&self) -> Result<Option<u64>, CapabilityError> {
            Ok(Some(10))
        }
    }

    struct FixedSensor;

    #[async_trait]
    impl SensorSource for FixedSensor {
        async fn take_steps(&self) -> Result<u64, CapabilityError> {
            Ok(1)
        }
    }

    fn offered() -> PlatformSources {
        PlatformSources {
            sensor: Some(Arc::new(FixedSensor)),
            health: Some(Arc::new(FixedHealth)),
            third_party: None,
            location: None,
        }
    }

    #[test]
    fn test_android_keeps_everything() {
        let set = SourceSet::for_platform(Platform::Android, offered());
        assert!(set.sensor.is_some());
        assert!(set.health.is_some());
    }

    #[test]
    fn test_ios_drops_background_sensor() {
        let set = SourceSet::for_platform(Platform::Ios, offered());
        assert!(set.sensor.is_none());
        assert!(set.health.is_some());
    }

    #[test]
    fn test_web_has_no_device_sources() {
        let set = SourceSet::for_platform(Platform::Web, offered());
        assert!(set.is_empty());
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!("Android".parse::<Platform>(), Ok(Platform::Android));
        assert_eq!("ios".parse::<Platform>(), Ok(Platform::Ios));
        assert!("symbian".parse::<Platform>().is_err());
    }
}
