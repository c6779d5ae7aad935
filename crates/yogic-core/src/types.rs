//! ============================================================================
//! Core Types for Step Tracking
//! ============================================================================
//! Defines the step snapshot, source identifiers and milestone events.
//! The snapshot is serialized to JSON for the local store and the host UI.
//! ============================================================================

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Daily step ceiling eligible for rewards
pub const MAX_DAILY_STEPS: u64 = 12_000;

/// Fastest plausible walking speed in km/h
pub const MAX_WALKING_SPEED_KMH: f64 = 12.0;

/// Steps between milestone celebrations
pub const MILESTONE_INTERVAL: u64 = 1_000;

/// Where a step reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    /// On-device motion sensor / background step service
    Sensor,
    /// Platform health API (Health Connect, HealthKit)
    HealthApi,
    /// Third-party fitness platform (wearable cloud API)
    ThirdParty,
}

/// Unrecognised name for an enum parsed from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseNameError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for StepSource {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sensor" => Ok(Self::Sensor),
            "health" | "health_api" | "health-api" => Ok(Self::HealthApi),
            "third_party" | "third-party" | "wearable" => Ok(Self::ThirdParty),
            _ => Err(ParseNameError {
                kind: "step source",
                value: s.to_string(),
            }),
        }
    }
}

impl StepSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::HealthApi => "health_api",
            Self::ThirdParty => "third_party",
        }
    }
}

/// Device-local step state.
/// Owned by the reconciler and persisted after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSnapshot {
    /// Steps attributed to the current calendar day (capped)
    pub daily_steps: u64,
    /// Running total, never decreases
    pub lifetime_steps: u64,
    /// Steps not yet delivered to the balance mutation
    pub pending_steps: u64,
    /// Latest cumulative count from the sensor or health API
    pub device_steps: u64,
    #[serde(deserialize_with = "null_as_zero")]
    pub current_speed_kmh: f64,
    pub is_valid_speed: bool,
    #[serde(deserialize_with = "null_as_zero")]
    pub gps_accuracy_meters: f64,
    pub third_party_steps: u64,
    pub third_party_connected: bool,
    pub last_third_party_sync: Option<DateTime<Utc>>,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Local calendar day the daily counters belong to
    pub day: Option<NaiveDate>,
}

impl Default for StepSnapshot {
    fn default() -> Self {
        Self {
            daily_steps: 0,
            lifetime_steps: 0,
            pending_steps: 0,
            device_steps: 0,
            current_speed_kmh: 0.0,
            is_valid_speed: true,
            gps_accuracy_meters: 0.0,
            third_party_steps: 0,
            third_party_connected: false,
            last_third_party_sync: None,
            last_sync_time: None,
            day: None,
        }
    }
}

/// serde_json writes non-finite floats as `null`
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// A location-derived speed reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub speed_kmh: f64,
    pub accuracy_meters: f64,
}

/// Emitted when the daily count crosses a milestone boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneEvent {
    /// Boundary reached, e.g. 3000
    pub milestone: u64,
    pub daily_steps: u64,
    pub reached_at: DateTime<Utc>,
}

/// Errors surfaced by the step entry paths
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("Moving too fast to add steps: {speed_kmh:.1} km/h exceeds {limit_kmh:.1} km/h")]
    SpeedViolation { speed_kmh: f64, limit_kmh: f64 },

    #[error("Invalid step count: {0}")]
    InvalidStepCount(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_source_parsing() {
        assert_eq!("sensor".parse::<StepSource>(), Ok(StepSource::Sensor));
        assert_eq!("Health".parse::<StepSource>(), Ok(StepSource::HealthApi));
        assert_eq!(" wearable ".parse::<StepSource>(), Ok(StepSource::ThirdParty));

        let err = "gps".parse::<StepSource>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown step source 'gps'");
        assert_eq!(StepSource::ThirdParty.as_str(), "third_party");
    }

    #[test]
    fn test_snapshot_tolerates_missing_fields() {
        let snapshot: StepSnapshot =
            serde_json::from_str(r#"{"daily_steps": 420, "lifetime_steps": 9000}"#).unwrap();
        assert_eq!(snapshot.daily_steps, 420);
        assert_eq!(snapshot.lifetime_steps, 9000);
        assert_eq!(snapshot.pending_steps, 0);
        assert!(snapshot.is_valid_speed);
        assert!(snapshot.day.is_none());
    }

    #[test]
    fn test_snapshot_tolerates_null_floats() {
        let snapshot: StepSnapshot = serde_json::from_str(
            r#"{"daily_steps": 5000, "pending_steps": 5000, "current_speed_kmh": null, "gps_accuracy_meters": null}"#,
        )
        .unwrap();
        assert_eq!(snapshot.pending_steps, 5000);
        assert_eq!(snapshot.current_speed_kmh, 0.0);
        assert_eq!(snapshot.gps_accuracy_meters, 0.0);

        // Non-finite values written by serde_json come back as zero
        let written = serde_json::to_string(&StepSnapshot {
            gps_accuracy_meters: f64::NAN,
            pending_steps: 7,
            ..StepSnapshot::default()
        })
        .unwrap();
        let restored: StepSnapshot = serde_json::from_str(&written).unwrap();
        assert_eq!(restored.pending_steps, 7);
        assert_eq!(restored.gps_accuracy_meters, 0.0);
    }

    #[test]
    fn test_speed_violation_message() {
        let err = StepError::SpeedViolation {
            speed_kmh: 15.0,
            limit_kmh: 12.0,
        };
        assert_eq!(
            err.to_string(),
            "Moving too fast to add steps: 15.0 km/h exceeds 12.0 km/h"
        );
    }
}
