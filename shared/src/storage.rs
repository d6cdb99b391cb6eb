use std::collections::HashMap;

pub const MAP_SETTINGS_KEY: &str = "mapSettings";
pub const MISSION_SETTINGS_KEY: &str = "missionSettings";
pub const LAST_WAYPOINT_KEY: &str = "lastWaypointValues";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("settings storage is unavailable")]
    Unavailable,
    #[error("failed to write `{key}`: {message}")]
    Write { key: String, message: String },
}

/// String key/value persistence (browser localStorage in the client).
pub trait SettingsStorage {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Used by tests and as the client fallback when
/// localStorage is blocked.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    /// Number of successful writes since creation.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SettingsStorage for MemoryStorage {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}
