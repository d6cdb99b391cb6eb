pub mod colors;
pub mod commands;
pub mod config;
pub mod frame;
pub mod grid;
pub mod layer;
pub mod mission;
pub mod names;
pub mod overlay;
pub mod reports;
pub mod snapshot;
pub mod spatial;
pub mod storage;
pub mod telemetry;
pub mod tiles;
pub mod transform;
pub mod viewport;

pub use config::{ConfigError, ConfigStore, LoadOutcome, MapConfig};
pub use frame::{FrameCoalescer, ViewEvent};
pub use layer::{FrameContext, MapLayer, OverlaySurface, render_layers};
pub use storage::{SettingsStorage, StorageError};
pub use transform::MapProjection;
pub use viewport::Viewport;
