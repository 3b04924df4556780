//! Configuration loading and typed config structures for the arena host.
//!
//! The configuration lives in `arena-config.yaml`. Every section and field
//! has a default, so a missing file or an empty document yields a usable
//! configuration. [`ArenaConfig::validate`] normalises the hysteresis band
//! and rejects values the monitor cannot work with.

use std::path::Path;

use arena_types::{ArenaId, Position, Zone};
use arena_zone::geometry;
use arena_zone::registry::{
    DefaultZoneSettings, FALLBACK_CENTER, FALLBACK_NAME, FALLBACK_RADIUS, RegistrySettings,
};
use chrono::TimeDelta;
use serde::Deserialize;
use tracing::warn;

use crate::auto_enter::AutoEnterSettings;
use crate::proximity::ProximitySettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level arena configuration, mirroring `arena-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArenaConfig {
    /// Default zone synthesized for unseen arena ids.
    #[serde(default)]
    pub zone: ZoneConfig,

    /// Proximity monitor parameters.
    #[serde(default)]
    pub proximity: ProximityConfig,

    /// Auto-enter parameters.
    #[serde(default)]
    pub auto_enter: AutoEnterConfig,

    /// Host loop parameters.
    #[serde(default)]
    pub host: HostConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Zones activated at startup.
    #[serde(default)]
    pub zones: Vec<ZoneDefinition>,
}

impl ArenaConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path`, falling back to defaults if the file does not
    /// exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and normalise the hysteresis band.
    ///
    /// An `exit_radius` smaller than `enter_radius` is raised to
    /// `enter_radius`, which gives single-threshold behavior.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let proximity = &mut self.proximity;
        require_positive("proximity.interval_seconds", proximity.interval_seconds)?;
        require_positive("proximity.enter_radius", proximity.enter_radius)?;
        if !proximity.exit_radius.is_finite() {
            return Err(invalid("proximity.exit_radius", "must be finite"));
        }
        if proximity.exit_radius < proximity.enter_radius {
            warn!(
                enter_radius = proximity.enter_radius,
                exit_radius = proximity.exit_radius,
                "exit_radius below enter_radius, using enter_radius"
            );
            proximity.exit_radius = proximity.enter_radius;
        }
        if proximity.arena_label.trim().is_empty() {
            return Err(invalid("proximity.arena_label", "must not be empty"));
        }

        if self.zone.enabled {
            require_positive("zone.radius", self.zone.radius)?;
            if !self.zone.center.is_finite() {
                return Err(invalid("zone.center", "must be finite"));
            }
        }

        for definition in &self.zones {
            if let Some(reason) = geometry::geometry_defect(&definition.zone) {
                return Err(ConfigError::Invalid {
                    field: "zones",
                    reason: format!("arena {}: {reason}", definition.arena_id),
                });
            }
        }
        Ok(())
    }

    /// Registry settings derived from the `zone` section.
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            default_zone: DefaultZoneSettings {
                enabled: self.zone.enabled,
                center: self.zone.center,
                radius: self.zone.radius,
                name: self.zone.name.clone(),
            },
            auto_deactivate_when_empty: self.zone.auto_deactivate_when_empty,
            ..RegistrySettings::default()
        }
    }

    /// Proximity monitor settings derived from the `proximity` section.
    pub fn proximity_settings(&self) -> ProximitySettings {
        ProximitySettings {
            interval_seconds: self.proximity.interval_seconds,
            enter_radius: self.proximity.enter_radius,
            exit_radius: self.proximity.exit_radius,
            arena_id: self.proximity.arena_id,
            arena_label: self.proximity.arena_label.clone(),
        }
    }

    /// Auto-enter settings derived from the `auto_enter` and `proximity`
    /// sections.
    pub fn auto_enter_settings(&self) -> AutoEnterSettings {
        AutoEnterSettings {
            cooldown: i64::try_from(self.auto_enter.cooldown_seconds)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            enter_radius: self.proximity.enter_radius,
            arena_id: self.proximity.arena_id,
            arena_label: self.proximity.arena_label.clone(),
        }
    }
}

fn require_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be finite and positive"))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}

/// Default zone configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneConfig {
    /// Use this section's center and radius for synthesized zones.
    /// When `false` the built-in practice arena is used.
    #[serde(default)]
    pub enabled: bool,

    /// Center of the default zone.
    #[serde(default = "default_zone_center")]
    pub center: Position,

    /// Radius of the default zone.
    #[serde(default = "default_zone_radius")]
    pub radius: f32,

    /// Display name of the default zone.
    #[serde(default = "default_zone_name")]
    pub name: String,

    /// Deactivate a zone when its last member leaves.
    #[serde(default)]
    pub auto_deactivate_when_empty: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            center: default_zone_center(),
            radius: default_zone_radius(),
            name: default_zone_name(),
            auto_deactivate_when_empty: false,
        }
    }
}

/// Proximity monitor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProximityConfig {
    /// Seconds between scans.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f32,

    /// Distance at or below which an outside player enters.
    #[serde(default = "default_enter_radius")]
    pub enter_radius: f32,

    /// Distance at or below which an inside player stays inside.
    #[serde(default = "default_exit_radius")]
    pub exit_radius: f32,

    /// Arena players are admitted to.
    #[serde(default = "default_arena_id")]
    pub arena_id: ArenaId,

    /// Label passed to the lifecycle service on entry.
    #[serde(default = "default_arena_label")]
    pub arena_label: String,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            enter_radius: default_enter_radius(),
            exit_radius: default_exit_radius(),
            arena_id: default_arena_id(),
            arena_label: default_arena_label(),
        }
    }
}

/// Auto-enter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AutoEnterConfig {
    /// Minimum seconds between two auto-enter attempts for one player.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl Default for AutoEnterConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Host loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Milliseconds between host ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many host ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A zone to activate at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneDefinition {
    /// Arena slot to activate.
    pub arena_id: ArenaId,
    /// Zone definition.
    pub zone: Zone,
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_zone_center() -> Position {
    FALLBACK_CENTER
}

const fn default_zone_radius() -> f32 {
    FALLBACK_RADIUS
}

fn default_zone_name() -> String {
    FALLBACK_NAME.to_owned()
}

const fn default_interval_seconds() -> f32 {
    3.0
}

const fn default_enter_radius() -> f32 {
    50.0
}

const fn default_exit_radius() -> f32 {
    75.0
}

const fn default_arena_id() -> ArenaId {
    ArenaId::new(0)
}

fn default_arena_label() -> String {
    "default_arena".to_owned()
}

const fn default_cooldown_seconds() -> u64 {
    5
}

const fn default_tick_interval_ms() -> u64 {
    250
}

fn default_log_level() -> String {
    "info".to_owned()
}
