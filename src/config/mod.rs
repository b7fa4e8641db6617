//! # System configuration, secrets, and runtime overrides.
//!
//! [`SystemConfig`] centralizes runtime settings loaded from a JSON file
//! (strict schema, unknown keys rejected). A missing file yields defaults,
//! so a bare checkout boots.
//!
//! ## Sentinel-free by construction
//! Timeouts and capacities carry their real defaults here instead of `0`
//! sentinels; accessors return `Duration`s ready to use.

mod overrides;
mod secrets;

pub use overrides::OverrideStore;
pub use secrets::Secrets;

use std::path::Path;
use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::error::ConfigError;

/// Geographic location handed to units that need one.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Location {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl Default for Location {
    /// London.
    fn default() -> Self {
        Self {
            lat: 51.5074,
            lon: -0.1278,
        }
    }
}

/// Non-hardware runtime settings.
///
/// ## Field semantics
/// - `bus_queue_size`: bounded event queue depth (min 1, clamped by the bus)
/// - `stop_timeout_seconds`: bounded wait when cooperatively stopping a unit
/// - `location`: system-wide location exposed through the capability object
/// - `dev_mode`: mock hardware / relaxed behavior for development hosts
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SystemConfig {
    /// Maximum queued events before the oldest is dropped.
    pub bus_queue_size: usize,

    /// Bounded wait for a unit to observe cancellation on stop.
    pub stop_timeout_seconds: u64,

    /// Default geographic location.
    pub location: Location,

    /// Development mode (mock hardware hosts).
    pub dev_mode: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            bus_queue_size: 1000,
            stop_timeout_seconds: 5,
            location: Location::default(),
            dev_mode: false,
        }
    }
}

impl SystemConfig {
    /// Loads config from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SystemConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Bounded stop wait as a `Duration`.
    #[inline]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}
