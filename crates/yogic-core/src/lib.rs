//! ============================================================================
//! YOGIC-CORE: Step Tracking Engine for Yogic Mile
//! ============================================================================
//! This crate handles the client-side logic behind the walking rewards:
//! - Step reconciliation across sensor, health API and wearable sources
//! - Pending step sync to the remote balance mutation
//! - OTP delivery with tiered transport fallback
//! - Local durable state via redb
//! ============================================================================

pub mod config;
pub mod db;
pub mod otp;
pub mod platform;
pub mod reconciler;
pub mod sync;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use config::{BackendConfig, TrackerConfig};
pub use db::{KeyValueStore, MemoryStore, StepDb, StoreError};
pub use otp::{OtpDelivery, OtpError, OtpTransport};
pub use platform::{Notifier, Platform, SourceSet};
pub use reconciler::StepReconciler;
pub use sync::{SessionHandle, SyncError, SyncOutcome, SyncScheduler, UserSession};
pub use tracker::StepTracker;
pub use types::*;
