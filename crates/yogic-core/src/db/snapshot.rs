//! Snapshot persistence on top of [`KeyValueStore`].
//!
//! Missing or malformed values always load as "no prior state".

use tracing::warn;

use super::{KeyValueStore, StoreError};
use crate::types::StepSnapshot;

pub const SNAPSHOT_KEY: &str = "step_snapshot";
pub const ONBOARDING_KEY: &str = "has_shown_onboarding";

/// Load the persisted snapshot, falling back to a fresh one
pub fn load_snapshot(store: &dyn KeyValueStore) -> StepSnapshot {
    let raw = match store.get(SNAPSHOT_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return StepSnapshot::default(),
        Err(e) => {
            warn!("Failed to read step snapshot: {} - starting fresh", e);
            return StepSnapshot::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Discarding malformed step snapshot: {}", e);
            StepSnapshot::default()
        }
    }
}

pub fn save_snapshot(store: &dyn KeyValueStore, snapshot: &StepSnapshot) -> Result<(), StoreError> {
    let json = serde_json::to_string(snapshot).map_err(|e| StoreError::Encode(e.to_string()))?;
    store.set(SNAPSHOT_KEY, &json)
}

pub fn has_shown_onboarding(store: &dyn KeyValueStore) -> bool {
    matches!(store.get(ONBOARDING_KEY), Ok(Some(v)) if v == "true")
}

pub fn mark_onboarding_shown(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.set(ONBOARDING_KEY, "true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_missing_snapshot_is_fresh() {
        let store = MemoryStore::new();
        assert_eq!(load_snapshot(&store), StepSnapshot::default());
    }

    #[test]
    fn test_malformed_snapshot_is_fresh() {
        let store = MemoryStore::new();
        store.set(SNAPSHOT_KEY, "{not json").unwrap();
        assert_eq!(load_snapshot(&store), StepSnapshot::default());

        store.set(SNAPSHOT_KEY, r#"{"daily_steps": "lots"}"#).unwrap();
        assert_eq!(load_snapshot(&store), StepSnapshot::default());
    }

    #[test]
    fn test_snapshot_persists() {
        let store = MemoryStore::new();
        let snapshot = StepSnapshot {
            daily_steps: 3200,
            lifetime_steps: 40_000,
            pending_steps: 150,
            ..StepSnapshot::default()
        };
        save_snapshot(&store, &snapshot).unwrap();
        assert_eq!(load_snapshot(&store), snapshot);
    }

    #[test]
    fn test_onboarding_flag() {
        let store = MemoryStore::new();
        assert!(!has_shown_onboarding(&store));
        store.set(ONBOARDING_KEY, "yes please").unwrap();
        assert!(!has_shown_onboarding(&store));
        mark_onboarding_shown(&store).unwrap();
        assert!(has_shown_onboarding(&store));
    }
}
