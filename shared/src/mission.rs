use serde::{Deserialize, Serialize};

use crate::commands::UpdateInterval;
use crate::storage::{MISSION_SETTINGS_KEY, SettingsStorage, StorageError};

/// Per-operator mission preferences, persisted as `missionSettings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionSettings {
    pub update_interval: u32,
    pub llm_side: String,
    /// `side` or `side:group`.
    pub preset: String,
    pub display_side: String,
    pub llm_model: String,
}

impl Default for MissionSettings {
    fn default() -> Self {
        Self {
            update_interval: 60,
            llm_side: "OPFOR".to_string(),
            preset: String::new(),
            display_side: String::new(),
            llm_model: String::new(),
        }
    }
}

impl MissionSettings {
    /// Stored settings with missing keys defaulted; defaults if unreadable.
    pub fn load(storage: &dyn SettingsStorage) -> Self {
        let mut settings: Self = storage
            .read(MISSION_SETTINGS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        settings.update_interval = UpdateInterval::clamped(settings.update_interval).interval;
        settings
    }

    pub fn save(&self, storage: &mut dyn SettingsStorage) -> Result<(), StorageError> {
        let json = serde_json::to_string(self).map_err(|e| StorageError::Write {
            key: MISSION_SETTINGS_KEY.to_string(),
            message: e.to_string(),
        })?;
        storage.write(MISSION_SETTINGS_KEY, &json)
    }

    /// Split the preset into side and optional group.
    pub fn preset_target(&self) -> Option<(&str, Option<&str>)> {
        let preset = self.preset.trim();
        if preset.is_empty() {
            return None;
        }
        match preset.split_once(':') {
            Some((side, group)) if !group.trim().is_empty() => Some((side.trim(), Some(group.trim()))),
            Some((side, _)) => Some((side.trim(), None)),
            None => Some((preset, None)),
        }
    }

    /// Display filter, `None` when every side is shown.
    pub fn display_filter(&self) -> Option<&str> {
        let side = self.display_side.trim();
        (!side.is_empty()).then_some(side)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::MissionSettings;
    use crate::storage::{MISSION_SETTINGS_KEY, MemoryStorage};

    #[test]
    fn tolerant_load_fills_missing_keys() {
        let blob = json!({ "displaySide": "BLUFOR", "updateInterval": 500 }).to_string();
        let storage = MemoryStorage::new().with_entry(MISSION_SETTINGS_KEY, &blob);
        let settings = MissionSettings::load(&storage);
        assert_eq!(settings.display_side, "BLUFOR");
        assert_eq!(settings.update_interval, 60);
        assert_eq!(settings.llm_side, "OPFOR");
        assert_eq!(settings.display_filter(), Some("BLUFOR"));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let storage = MemoryStorage::new().with_entry(MISSION_SETTINGS_KEY, "[1,2");
        assert_eq!(MissionSettings::load(&storage), MissionSettings::default());
    }

    #[test]
    fn preset_parsing() {
        let mut settings = MissionSettings::default();
        assert_eq!(settings.preset_target(), None);
        settings.preset = "OPFOR".to_string();
        assert_eq!(settings.preset_target(), Some(("OPFOR", None)));
        settings.preset = "OPFOR:Alpha 1-1".to_string();
        assert_eq!(settings.preset_target(), Some(("OPFOR", Some("Alpha 1-1"))));
        settings.preset = "BLUFOR:".to_string();
        assert_eq!(settings.preset_target(), Some(("BLUFOR", None)));
    }

    #[test]
    fn save_then_load() {
        let mut storage = MemoryStorage::new();
        let settings = MissionSettings {
            update_interval: 15,
            preset: "OPFOR:Tank 1".to_string(),
            ..MissionSettings::default()
        };
        settings.save(&mut storage).unwrap();
        assert_eq!(MissionSettings::load(&storage), settings);
    }
}
