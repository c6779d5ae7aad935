//! ============================================================================
//! Platform Module - Injected device capabilities
//! ============================================================================
//! Step sources, location and notifications are reached through capability
//! traits so the reconciler never talks to a platform plugin directly.
//!
//! ## Sources
//! - **Sensor**: background step service, reports deltas
//! - **Health**: Health Connect / HealthKit, cumulative since midnight
//! - **Third party**: wearable platform API, cumulative since midnight
//! - **Location**: speed samples for the walking-speed gate
//!
//! The set of sources is chosen once per [`Platform`] at startup.
//! ============================================================================

mod capabilities;
mod sources;

pub use capabilities::{
    CapabilityError, HealthSource, LocationSource, NoopNotifier, Notifier, SensorSource,
    ThirdPartySource,
};
pub use sources::{Platform, PlatformSources, SourceSet};
