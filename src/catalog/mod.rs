//! # Catalog: unit discovery and selector resolution.
//!
//! The catalog owns the on-disk picture of installed units:
//!
//! ```text
//! units/
//! ├── echo_unit/
//! │   └── unit.json          ← descriptor (strict schema, migrated)
//! ├── clock/
//! │   └── unit.json
//! └── selector_map.json      ← selector position → unit id
//! ```
//!
//! ## Rules
//! - `scan()` never fails as a whole: a unit whose descriptor is missing or
//!   invalid is logged and skipped, the rest of the catalog still loads.
//! - Scanning is idempotent: rescanning an unchanged tree yields an equal
//!   catalog.
//! - A selector position that maps to a unit id with no surviving
//!   descriptor resolves to `None` (the mapping is kept but inert).

mod descriptor;
mod selector_map;

pub use descriptor::{Descriptor, TimeoutBehavior};
pub use selector_map::SelectorMap;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::Secrets;
use crate::error::CatalogError;

/// Descriptor file name inside each unit directory.
pub const DESCRIPTOR_FILE: &str = "unit.json";

/// Selector map file name inside the units root.
pub const SELECTOR_MAP_FILE: &str = "selector_map.json";

/// One discovered unit: its directory and validated descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub dir: PathBuf,
    pub descriptor: Descriptor,
}

/// Lightweight listing row for displays and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSummary {
    pub unit_id: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
}

/// One selector-map row joined with its unit's descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorEntry {
    pub selector: u8,
    pub unit_id: String,
    pub display_name: String,
    pub description: String,
}

/// The scanned units tree plus the selector map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    units_dir: PathBuf,
    units: BTreeMap<String, UnitRecord>,
    selector_map: SelectorMap,
}

impl Catalog {
    /// Creates an empty catalog rooted at `units_dir`. Call [`scan`] to
    /// populate it.
    ///
    /// [`scan`]: Catalog::scan
    pub fn new(units_dir: impl Into<PathBuf>) -> Self {
        Self {
            units_dir: units_dir.into(),
            units: BTreeMap::new(),
            selector_map: SelectorMap::new(),
        }
    }

    /// Rebuilds the catalog from disk. Returns the number of units loaded.
    ///
    /// Individual unit failures (missing/unreadable/invalid descriptor) are
    /// logged and skipped. Only a missing or unreadable units root is an
    /// error.
    pub fn scan(&mut self) -> Result<usize, CatalogError> {
        let mut units = BTreeMap::new();

        let entries = std::fs::read_dir(&self.units_dir).map_err(|source| CatalogError::Io {
            path: self.units_dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: self.units_dir.clone(),
                source,
            })?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(unit_id) = dir.file_name().and_then(|n| n.to_str()) else {
                warn!("skipping unit directory with non-utf8 name: {}", dir.display());
                continue;
            };
            if unit_id.starts_with('.') {
                continue;
            }

            match load_descriptor(&dir) {
                Ok(descriptor) => {
                    debug!("loaded unit {unit_id} v{}", descriptor.version);
                    units.insert(unit_id.to_string(), UnitRecord { dir, descriptor });
                }
                Err(e) => {
                    warn!("skipping unit {unit_id}: {e}");
                }
            }
        }

        self.selector_map = SelectorMap::load(&self.units_dir.join(SELECTOR_MAP_FILE))?;
        self.units = units;

        info!(
            "catalog scan: {} unit(s), {} selector mapping(s)",
            self.units.len(),
            self.selector_map.len()
        );
        Ok(self.units.len())
    }

    /// Resolves a selector position to a unit id. `None` when the position
    /// is unmapped or the mapped unit has no loaded descriptor.
    pub fn resolve(&self, position: u8) -> Option<&str> {
        let unit_id = self.selector_map.get(position)?;
        if self.units.contains_key(unit_id) {
            Some(unit_id)
        } else {
            warn!("selector {position} maps to unknown unit {unit_id:?}");
            None
        }
    }

    /// Descriptor for a unit id, if loaded.
    pub fn descriptor(&self, unit_id: &str) -> Option<&Descriptor> {
        self.units.get(unit_id).map(|r| &r.descriptor)
    }

    /// On-disk directory for a unit id, if loaded.
    pub fn unit_dir(&self, unit_id: &str) -> Option<&Path> {
        self.units.get(unit_id).map(|r| r.dir.as_path())
    }

    /// All loaded unit ids in sorted order.
    pub fn unit_ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// All `(unit_id, descriptor)` pairs in sorted order.
    pub fn descriptors(&self) -> impl Iterator<Item = (&str, &Descriptor)> {
        self.units.iter().map(|(id, r)| (id.as_str(), &r.descriptor))
    }

    pub fn selector_map(&self) -> &SelectorMap {
        &self.selector_map
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Listing rows for every loaded unit, sorted by unit id.
    pub fn summaries(&self) -> Vec<UnitSummary> {
        self.units
            .iter()
            .map(|(unit_id, record)| UnitSummary {
                unit_id: unit_id.clone(),
                display_name: record.descriptor.effective_display_name(unit_id).to_string(),
                description: record.descriptor.description.clone(),
                version: record.descriptor.version.clone(),
            })
            .collect()
    }

    /// Selector-map rows joined with their descriptors, ascending by
    /// selector. Rows mapping to units without a loaded descriptor are
    /// omitted.
    pub fn selector_listing(&self) -> Vec<SelectorEntry> {
        self.selector_map
            .iter()
            .filter_map(|(selector, unit_id)| {
                self.units.get(unit_id).map(|record| SelectorEntry {
                    selector,
                    unit_id: unit_id.to_string(),
                    display_name: record.descriptor.effective_display_name(unit_id).to_string(),
                    description: record.descriptor.description.clone(),
                })
            })
            .collect()
    }

    /// Warns (non-fatally) about declared secrets that are not resolvable.
    pub fn warn_missing_secrets(&self, secrets: &Secrets) {
        for (unit_id, record) in &self.units {
            for key in &record.descriptor.required_secrets {
                if !secrets.has(key) {
                    warn!("unit {unit_id} requires secret {key:?} which is not set");
                }
            }
        }
    }
}

fn load_descriptor(dir: &Path) -> Result<Descriptor, CatalogError> {
    let path = dir.join(DESCRIPTOR_FILE);
    let raw = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
        path,
        source,
    })?;
    Descriptor::from_json(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_unit(root: &Path, unit_id: &str, descriptor: &str) {
        let dir = root.join(unit_id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), descriptor).unwrap();
    }

    #[test]
    fn scan_loads_units_and_selector_map() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "echo_unit", r#"{"name": "Echo", "version": "2.0.0"}"#);
        write_unit(tmp.path(), "clock", "{}");
        fs::write(
            tmp.path().join(SELECTOR_MAP_FILE),
            r#"{"7": "echo_unit", "12": "clock"}"#,
        )
        .unwrap();

        let mut catalog = Catalog::new(tmp.path());
        assert_eq!(catalog.scan().unwrap(), 2);
        assert_eq!(catalog.resolve(7), Some("echo_unit"));
        assert_eq!(catalog.resolve(12), Some("clock"));
        assert_eq!(catalog.resolve(3), None);
        assert_eq!(
            catalog.descriptor("echo_unit").unwrap().name.as_deref(),
            Some("Echo")
        );
        assert_eq!(catalog.unit_dir("clock").unwrap(), tmp.path().join("clock"));
    }

    #[test]
    fn invalid_descriptor_skips_unit_not_scan() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "good", "{}");
        write_unit(tmp.path(), "broken", "{not json");
        write_unit(tmp.path(), "bad_timeout", r#"{"timeout_seconds": 0}"#);

        let mut catalog = Catalog::new(tmp.path());
        assert_eq!(catalog.scan().unwrap(), 1);
        assert!(catalog.descriptor("good").is_some());
        assert!(catalog.descriptor("broken").is_none());
        assert!(catalog.descriptor("bad_timeout").is_none());
    }

    #[test]
    fn mapping_to_missing_unit_resolves_none() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "real", "{}");
        fs::write(tmp.path().join(SELECTOR_MAP_FILE), r#"{"5": "phantom"}"#).unwrap();

        let mut catalog = Catalog::new(tmp.path());
        catalog.scan().unwrap();
        assert_eq!(catalog.resolve(5), None);
        // The mapping itself is still present.
        assert_eq!(catalog.selector_map().get(5), Some("phantom"));
    }

    #[test]
    fn rescan_of_unchanged_tree_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "echo_unit", r#"{"name": "Echo"}"#);
        fs::write(tmp.path().join(SELECTOR_MAP_FILE), r#"{"7": "echo_unit"}"#).unwrap();

        let mut first = Catalog::new(tmp.path());
        first.scan().unwrap();
        let mut second = first.clone();
        second.scan().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_units_root_is_an_error() {
        let mut catalog = Catalog::new("/nonexistent/units");
        assert!(matches!(catalog.scan(), Err(CatalogError::Io { .. })));
    }

    #[test]
    fn summaries_use_display_name_fallback() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "plain", "{}");
        write_unit(tmp.path(), "named", r#"{"name": "Fancy Name"}"#);

        let mut catalog = Catalog::new(tmp.path());
        catalog.scan().unwrap();
        let summaries = catalog.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].display_name, "Fancy Name");
        assert_eq!(summaries[1].display_name, "plain");
    }

    #[test]
    fn selector_listing_is_sorted_and_joined() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "echo_unit", r#"{"name": "Echo", "description": "says hi"}"#);
        write_unit(tmp.path(), "clock", "{}");
        fs::write(
            tmp.path().join(SELECTOR_MAP_FILE),
            r#"{"12": "clock", "7": "echo_unit", "3": "phantom"}"#,
        )
        .unwrap();

        let mut catalog = Catalog::new(tmp.path());
        catalog.scan().unwrap();
        let listing = catalog.selector_listing();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].selector, 7);
        assert_eq!(listing[0].display_name, "Echo");
        assert_eq!(listing[1].selector, 12);
        assert_eq!(listing[1].unit_id, "clock");
    }

    #[test]
    fn hidden_directories_are_ignored() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), ".git", "{}");
        write_unit(tmp.path(), "visible", "{}");

        let mut catalog = Catalog::new(tmp.path());
        assert_eq!(catalog.scan().unwrap(), 1);
    }
}
