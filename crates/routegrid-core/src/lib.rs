//! routegrid-core — shared configuration for routegrid.
//!
//! Parses `routegrid.toml` and defines [`CoordinatorSettings`], the pair of
//! durations delivered to every coordinator through a watch-based settings
//! stream.

pub mod config;
pub mod error;
pub mod settings;

pub use config::{
    CoordinatorSection, CoordinatorSettings, RoutegridConfig, StoreSection, DEFAULT_DOCUMENT_KEY,
};
pub use error::{ConfigError, ConfigResult};
pub use settings::{publish_if_changed, settings_channel, SettingsReceiver, SettingsSender};
