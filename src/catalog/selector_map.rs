//! Selector-position → unit-id map.
//!
//! The map file (`selector_map.json`) is either a flat object or wrapped in
//! an envelope:
//!
//! ```json
//! {"7": "echo_unit", "12": "clock"}
//! {"mappings": {"7": "echo_unit"}}
//! ```
//!
//! Keys must parse as integers in `0..=255`; values must be non-empty
//! strings. Invalid entries are dropped with a warning rather than failing
//! the load, so one bad line cannot take the whole map offline.

use std::collections::BTreeMap;
use std::path::Path;

use log::warn;
use serde_json::Value;

use crate::error::CatalogError;

/// Mapping from selector positions to unit ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorMap {
    entries: BTreeMap<u8, String>,
}

impl SelectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a map from a file. A missing or unparseable file yields an
    /// empty map (with a warning for the latter); only an unreadable file
    /// is an error.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(Self::from_value(&value)),
            Err(err) => {
                warn!("selector map {} is malformed ({err}); using empty map", path.display());
                Ok(Self::new())
            }
        }
    }

    /// Builds a map from a parsed JSON value, unwrapping the `mappings`
    /// envelope when present and dropping invalid entries with a warning.
    pub fn from_value(value: &Value) -> Self {
        let obj = match value.get("mappings") {
            Some(inner) => inner.as_object(),
            None => value.as_object(),
        };
        let Some(obj) = obj else {
            warn!("selector map is not a JSON object; using empty map");
            return Self::new();
        };

        let mut entries = BTreeMap::new();
        for (key, val) in obj {
            let Ok(position) = key.parse::<u8>() else {
                warn!("selector map: dropping entry with invalid position {key:?}");
                continue;
            };
            match val.as_str() {
                Some(unit_id) if !unit_id.is_empty() => {
                    entries.insert(position, unit_id.to_string());
                }
                _ => {
                    warn!("selector map: dropping entry {position} with invalid unit id {val}");
                }
            }
        }
        Self { entries }
    }

    /// Unit id mapped to a selector position, if any.
    pub fn get(&self, position: u8) -> Option<&str> {
        self.entries.get(&position).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All `(position, unit_id)` pairs in ascending position order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.entries.iter().map(|(p, u)| (*p, u.as_str()))
    }
}
