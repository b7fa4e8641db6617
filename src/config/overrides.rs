//! Runtime unit-config overrides persisted to JSON.
//!
//! Descriptors remain the source of defaults; this store holds admin-edited
//! values keyed by unit id. The merged view (descriptor config with
//! overrides applied on top) is what the capability object hands a unit.
//!
//! Writes go through a temp file in the same directory followed by a
//! rename, so a crash mid-write never leaves a truncated store behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::{Map, Value};

use crate::error::ConfigError;

type OverrideData = BTreeMap<String, Map<String, Value>>;

/// JSON-file-backed store of per-unit config overrides.
pub struct OverrideStore {
    path: PathBuf,
}

impl OverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Overrides for `unit_id`, empty if none stored.
    pub fn overrides_for(&self, unit_id: &str) -> Map<String, Value> {
        self.load().remove(unit_id).unwrap_or_default()
    }

    /// Replaces the overrides for `unit_id` and persists atomically.
    pub fn set_overrides(
        &self,
        unit_id: &str,
        overrides: Map<String, Value>,
    ) -> Result<(), ConfigError> {
        let mut data = self.load();
        data.insert(unit_id.to_string(), overrides);
        self.write_atomic(&data)
    }

    /// Removes any overrides for `unit_id`.
    pub fn clear_overrides(&self, unit_id: &str) -> Result<(), ConfigError> {
        let mut data = self.load();
        if data.remove(unit_id).is_some() {
            self.write_atomic(&data)?;
        }
        Ok(())
    }

    /// Loads the whole store; unreadable or malformed files degrade to
    /// empty with a warning (overrides are never required for a launch).
    fn load(&self) -> OverrideData {
        if !self.path.is_file() {
            return OverrideData::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<OverrideData>(&raw) {
                Ok(data) => data,
                Err(err) => {
                    warn!(
                        "override store {} is malformed ({}), ignoring",
                        self.path.display(),
                        err
                    );
                    OverrideData::new()
                }
            },
            Err(err) => {
                warn!(
                    "cannot read override store {}: {}",
                    self.path.display(),
                    err
                );
                OverrideData::new()
            }
        }
    }

    fn write_atomic(&self, data: &OverrideData) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.to_path_buf(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = tmp_sibling(&self.path);
        let payload = serde_json::to_string_pretty(data)?;
        std::fs::write(&tmp, payload).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "overrides.json".to_string());
    path.with_file_name(format!("{}.{}.tmp", name, std::process::id()))
}
