use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::{MAP_SETTINGS_KEY, SettingsStorage, StorageError};
use crate::transform::MapProjection;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a positive finite number, got {value}")]
    InvalidExtent { field: &'static str, value: f64 },
    #[error("{field} must be a positive grid step, got {value}")]
    InvalidStep { field: &'static str, value: f64 },
    #[error("failed to serialize map settings: {0}")]
    Serialize(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelStyle {
    pub font_family: String,
    pub font_size: f64,
    pub color: String,
    pub opacity: f64,
}

impl LabelStyle {
    /// CSS font shorthand, e.g. `14px sans-serif`.
    pub fn css_font(&self) -> String {
        format!("{}px {}", self.font_size, self.font_family)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellCoordStyle {
    pub show: bool,
    pub font_family: String,
    pub font_size: f64,
    pub color: String,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameStyle {
    pub display_name: String,
    pub font_family: String,
    pub font_size: f64,
    pub color: String,
    pub opacity: f64,
    pub min_zoom: i32,
}

impl NameStyle {
    /// Style synthesized for a place-name type seen for the first time.
    pub fn for_new_type(kind: &str) -> Self {
        Self {
            display_name: kind.to_string(),
            font_family: "sans-serif".to_string(),
            font_size: 14.0,
            color: "#000000".to_string(),
            opacity: 1.0,
            min_zoom: 4,
        }
    }

    fn preset(
        display_name: &str,
        font_family: &str,
        font_size: f64,
        color: &str,
        opacity: f64,
        min_zoom: i32,
    ) -> Self {
        Self {
            display_name: display_name.to_string(),
            font_family: font_family.to_string(),
            font_size,
            color: color.to_string(),
            opacity,
            min_zoom,
        }
    }
}

/// Mapping from place-name type key to its display style.
pub type NameSettings = BTreeMap<String, NameStyle>;

fn default_name_settings() -> NameSettings {
    [
        ("NameCityCapital", NameStyle::preset("Capital", "Arial", 16.0, "#FF0000", 1.0, 4)),
        ("NameCity", NameStyle::preset("City", "Verdana", 12.0, "#0000FF", 0.8, 5)),
        ("NameVillage", NameStyle::preset("Village", "'Times New Roman'", 14.0, "#00AA00", 0.9, 6)),
        ("Hill", NameStyle::preset("Hill", "Arial", 14.0, "#FFA500", 0.85, 5)),
        ("NameLocal", NameStyle::preset("Locality", "Courier New", 12.0, "#800080", 0.8, 6)),
        ("NameMarine", NameStyle::preset("Water", "Georgia", 12.0, "#0000FF", 0.8, 5)),
        ("Height", NameStyle::preset("Height", "Arial", 16.0, "#FF0000", 1.0, 4)),
    ]
    .into_iter()
    .map(|(key, style)| (key.to_string(), style))
    .collect()
}

/// User-configurable map and overlay parameters, persisted as the
/// `mapSettings` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    pub island_width: f64,
    pub island_height: f64,
    pub map_image_width: f64,
    pub map_image_height: f64,
    pub max_zoom: i32,
    pub km_step: f64,
    pub hm_step: f64,
    pub km_line_style: LineStyle,
    pub hm_line_style: LineStyle,
    pub label_style: LabelStyle,
    pub zoom_threshold: i32,
    pub cell_coord_style: CellCoordStyle,
    pub name_settings: NameSettings,
    #[serde(skip)]
    scale_factor: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        let mut config = Self {
            island_width: 15360.0,
            island_height: 15360.0,
            map_image_width: 32768.0,
            map_image_height: 32768.0,
            max_zoom: 9,
            km_step: 1000.0,
            hm_step: 100.0,
            km_line_style: LineStyle {
                color: "#ff0000".to_string(),
                weight: 2.0,
                opacity: 0.8,
            },
            hm_line_style: LineStyle {
                color: "#0000ff".to_string(),
                weight: 1.0,
                opacity: 0.5,
            },
            label_style: LabelStyle {
                font_family: "sans-serif".to_string(),
                font_size: 14.0,
                color: "#000000".to_string(),
                opacity: 0.8,
            },
            zoom_threshold: 4,
            cell_coord_style: CellCoordStyle {
                show: false,
                font_family: "sans-serif".to_string(),
                font_size: 12.0,
                color: "#000000".to_string(),
                opacity: 0.8,
            },
            name_settings: default_name_settings(),
            scale_factor: 0.0,
        };
        config.refresh_derived();
        config
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidExtent { field, value })
    }
}

fn positive_step(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidStep { field, value })
    }
}

impl MapConfig {
    /// Raster pixels per game meter along x.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn projection(&self) -> MapProjection {
        MapProjection::new(
            self.island_width,
            self.island_height,
            self.map_image_width,
            self.map_image_height,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("islandWidth", self.island_width)?;
        positive("islandHeight", self.island_height)?;
        positive("mapImageWidth", self.map_image_width)?;
        positive("mapImageHeight", self.map_image_height)?;
        positive_step("kmStep", self.km_step)?;
        positive_step("hmStep", self.hm_step)?;
        Ok(())
    }

    pub(crate) fn refresh_derived(&mut self) {
        self.scale_factor = self.map_image_width / self.island_width;
    }
}

/// How `ConfigStore::load` arrived at its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Nothing stored yet.
    Defaults,
    /// Stored blob used; lists the dotted paths of keys filled in from
    /// defaults.
    Restored { backfilled: Vec<String> },
    /// Stored blob unusable; defaults used instead.
    Recovered { reason: String },
}

/// Owner of the active `MapConfig`.
///
/// `revision` increases on every `apply`, which is what renderers watch to
/// know the configuration changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStore {
    config: MapConfig,
    revision: u64,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            config: MapConfig::default(),
            revision: 0,
        }
    }
}

impl ConfigStore {
    pub fn new(config: MapConfig) -> Result<Self, ConfigError> {
        let mut store = Self::default();
        store.set(config)?;
        Ok(store)
    }

    pub fn load(storage: &dyn SettingsStorage) -> (Self, LoadOutcome) {
        let Some(raw) = storage.read(MAP_SETTINGS_KEY) else {
            return (Self::default(), LoadOutcome::Defaults);
        };
        match restore(&raw) {
            Ok((config, backfilled)) => (
                Self {
                    config,
                    revision: 0,
                },
                LoadOutcome::Restored { backfilled },
            ),
            Err(reason) => (Self::default(), LoadOutcome::Recovered { reason }),
        }
    }

    pub fn get(&self) -> &MapConfig {
        &self.config
    }

    /// Replace the whole configuration. Invalid extents are rejected and the
    /// current configuration stays in place.
    pub fn set(&mut self, mut config: MapConfig) -> Result<(), ConfigError> {
        config.validate()?;
        config.refresh_derived();
        self.config = config;
        Ok(())
    }

    /// Recompute derived values and signal dependents. Returns the new revision.
    pub fn apply(&mut self) -> u64 {
        self.config.refresh_derived();
        self.revision += 1;
        self.revision
    }

    /// Edit a copy of the configuration, then replace and apply it. Nothing is
    /// persisted; an invalid edit leaves the store untouched.
    pub fn update(&mut self, edit: impl FnOnce(&mut MapConfig)) -> Result<u64, ConfigError> {
        let mut next = self.config.clone();
        edit(&mut next);
        self.set(next)?;
        Ok(self.apply())
    }

    pub fn save(&self, storage: &mut dyn SettingsStorage) -> Result<(), ConfigError> {
        let json = serde_json::to_string(&self.config)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        storage.write(MAP_SETTINGS_KEY, &json)?;
        Ok(())
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Style for a place-name type, if registered.
    pub fn name_style(&self, kind: &str) -> Option<&NameStyle> {
        self.config.name_settings.get(kind)
    }

    /// Insert a default style for every type not yet in `nameSettings` and
    /// persist the configuration if anything was added. Returns the number of
    /// types inserted.
    pub fn register_name_types<'a>(
        &mut self,
        kinds: impl IntoIterator<Item = &'a str>,
        storage: &mut dyn SettingsStorage,
    ) -> Result<usize, ConfigError> {
        let mut inserted = 0;
        for kind in kinds {
            if !self.config.name_settings.contains_key(kind) {
                self.config
                    .name_settings
                    .insert(kind.to_string(), NameStyle::for_new_type(kind));
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.save(storage)?;
        }
        Ok(inserted)
    }
}

const NAME_SETTINGS_KEY: &str = "nameSettings";

/// Copy every key missing from `stored` out of `defaults`, descending into
/// nested objects. Values present in `stored` are never replaced.
fn backfill(
    stored: &mut Map<String, Value>,
    defaults: &Map<String, Value>,
    prefix: &str,
    filled: &mut Vec<String>,
) {
    for (key, default) in defaults {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match stored.get_mut(key) {
            None => {
                stored.insert(key.clone(), default.clone());
                filled.push(path);
            }
            Some(Value::Object(inner)) => {
                if let Value::Object(default_inner) = default {
                    backfill(inner, default_inner, &path, filled);
                }
            }
            Some(_) => {}
        }
    }
}

/// Complete each stored name style from its preset, or from the new-type
/// style for types without one. Types the user has are kept, absent presets
/// are not re-added.
fn backfill_name_settings(
    stored: &mut Map<String, Value>,
    presets: &NameSettings,
    filled: &mut Vec<String>,
) -> Result<(), String> {
    for (kind, entry) in stored.iter_mut() {
        let Value::Object(entry) = entry else {
            continue;
        };
        let fallback = presets
            .get(kind)
            .cloned()
            .unwrap_or_else(|| NameStyle::for_new_type(kind));
        let fallback = serde_json::to_value(fallback)
            .map_err(|e| format!("failed to serialize defaults: {e}"))?;
        if let Value::Object(fallback) = fallback {
            backfill(entry, &fallback, &format!("{NAME_SETTINGS_KEY}.{kind}"), filled);
        }
    }
    Ok(())
}

fn restore(raw: &str) -> Result<(MapConfig, Vec<String>), String> {
    let mut stored = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err("stored settings are not an object".to_string()),
        Err(e) => return Err(format!("invalid JSON: {e}")),
    };

    let defaults = MapConfig::default();
    let mut default_map = match serde_json::to_value(&defaults) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err("defaults are not an object".to_string()),
        Err(e) => return Err(format!("failed to serialize defaults: {e}")),
    };
    let mut backfilled = Vec::new();

    let default_names = default_map.remove(NAME_SETTINGS_KEY);
    match stored.get_mut(NAME_SETTINGS_KEY) {
        Some(Value::Object(names)) => {
            backfill_name_settings(names, &defaults.name_settings, &mut backfilled)?;
        }
        Some(_) => {}
        None => {
            if let Some(default_names) = default_names {
                stored.insert(NAME_SETTINGS_KEY.to_string(), default_names);
                backfilled.push(NAME_SETTINGS_KEY.to_string());
            }
        }
    }
    backfill(&mut stored, &default_map, "", &mut backfilled);

    let mut config: MapConfig = serde_json::from_value(Value::Object(stored))
        .map_err(|e| format!("malformed settings: {e}"))?;
    config.validate().map_err(|e| e.to_string())?;
    config.refresh_derived();
    Ok((config, backfilled))
}
