//! Distinct-id lifecycle: anonymous device identity and user identification.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::constants::DEVICE_ID_PREFIX;
use crate::error::{invalid_argument, MinipanelResult};
use crate::persistence::Persistence;
use crate::util::generate_uuid;

pub(crate) struct IdentityManager {
    persistence: Arc<Persistence>,
}

impl IdentityManager {
    /// Resumes a prior identity if one is persisted, otherwise mints a fresh
    /// anonymous device identity.
    pub fn new(persistence: Arc<Persistence>) -> Self {
        let manager = Self { persistence };
        manager.ensure_device_identity();
        manager
    }

    /// The current distinct id. Always present after construction.
    pub fn distinct_id(&self) -> String {
        self.current_distinct_id().unwrap_or_default()
    }

    pub fn current_distinct_id(&self) -> Option<String> {
        let value = self.persistence.get("distinct_id")?;
        let id = value.as_str()?;
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    /// Switches to an identified distinct id, returning the previous id so
    /// the caller can report it as `$anon_distinct_id`. An empty id is an
    /// explicit error rather than a silent no-op.
    pub fn identify(&self, distinct_id: &str) -> MinipanelResult<String> {
        if distinct_id.is_empty() {
            return Err(invalid_argument("identify requires a non-empty distinct_id"));
        }

        let previous = self.distinct_id();
        let mut patch = Map::new();
        patch.insert("distinct_id".into(), Value::String(distinct_id.to_string()));
        patch.insert("$user_id".into(), Value::String(distinct_id.to_string()));
        self.persistence.register(patch);
        Ok(previous)
    }

    /// Clears all persisted state and re-enters the anonymous state with a
    /// new device id. The old device id is never reused.
    pub fn reset(&self) {
        self.persistence.clear();
        self.register_device_identity();
    }

    fn ensure_device_identity(&self) {
        if self.current_distinct_id().is_some() {
            return;
        }
        self.register_device_identity();
    }

    fn register_device_identity(&self) {
        let device_id = generate_uuid();
        let mut patch = Map::new();
        patch.insert(
            "distinct_id".into(),
            Value::String(format!("{DEVICE_ID_PREFIX}{device_id}")),
        );
        patch.insert("$device_id".into(), Value::String(device_id));
        self.persistence.register(patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStorage;
    use serde_json::json;

    fn manager() -> (Arc<Persistence>, IdentityManager) {
        let persistence = Arc::new(Persistence::new(
            Arc::new(MemoryStorage::new()),
            "mon_identity",
            false,
        ));
        let manager = IdentityManager::new(persistence.clone());
        (persistence, manager)
    }

    #[test]
    fn fresh_state_is_anonymous() {
        let (persistence, manager) = manager();
        let id = manager.distinct_id();
        assert!(id.starts_with("$device:"));

        let device_id = persistence.get("$device_id").unwrap();
        assert_eq!(json!(format!("$device:{}", device_id.as_str().unwrap())), json!(id));
    }

    #[test]
    fn prior_identity_is_resumed() {
        let storage = Arc::new(MemoryStorage::new());
        let persistence = Arc::new(Persistence::new(storage.clone(), "mon_identity", false));
        let first = IdentityManager::new(persistence);
        let original = first.distinct_id();

        let reopened = Arc::new(Persistence::new(storage, "mon_identity", false));
        let second = IdentityManager::new(reopened);
        assert_eq!(second.distinct_id(), original);
    }

    #[test]
    fn identify_records_user_id_and_returns_previous() {
        let (persistence, manager) = manager();
        let anon = manager.distinct_id();

        let previous = manager.identify("u-42").unwrap();
        assert_eq!(previous, anon);
        assert_eq!(manager.distinct_id(), "u-42");
        assert_eq!(persistence.get("$user_id"), Some(json!("u-42")));
        // The device id survives identification.
        assert!(persistence.get("$device_id").is_some());
    }

    #[test]
    fn identify_rejects_empty_id() {
        let (_, manager) = manager();
        let before = manager.distinct_id();
        let err = manager.identify("").unwrap_err();
        assert_eq!(err.code_str(), "minipanel/invalid-argument");
        assert_eq!(manager.distinct_id(), before);
    }

    #[test]
    fn reset_mints_a_new_device_identity() {
        let (_, manager) = manager();
        let anon = manager.distinct_id();
        manager.identify("u-42").unwrap();

        manager.reset();
        let after = manager.distinct_id();
        assert!(after.starts_with("$device:"));
        assert_ne!(after, anon);
        assert_ne!(after, "u-42");
    }
}
