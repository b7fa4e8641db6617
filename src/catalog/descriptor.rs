//! # Unit descriptor: strict schema with a legacy-migration pre-pass.
//!
//! A descriptor (`unit.json` in each unit directory) is parsed through a
//! versioned pipeline:
//!
//! ```text
//! raw JSON value ──► migrate() ──► strict decode ──► validate()
//!                    (rename /      (unknown keys     (timeout ≥ 1)
//!                     strip legacy    rejected)
//!                     keys)
//! ```
//!
//! Unknown top-level fields are rejected outright so a typo in a descriptor
//! surfaces at scan time instead of silently dropping config. The migration
//! pass keeps older descriptor generations parseable:
//! - `timeout` (v1 name) is renamed to `timeout_seconds`
//! - `author` (dropped from the schema) is stripped
//! - deprecated `timeout_behavior` values (`"kill"`, `"force_return"`) are
//!   normalized to `"return"`

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CatalogError;

/// Keys renamed between descriptor generations: `{old: new}`.
const LEGACY_RENAMES: [(&str, &str); 1] = [("timeout", "timeout_seconds")];

/// Keys removed from the schema entirely; stripped before strict decode.
const LEGACY_STRIPPED: [&str; 1] = ["author"];

/// Validated metadata for a single unit directory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Descriptor {
    /// Human-friendly display name; the unit id (directory name) is used
    /// when absent.
    pub name: Option<String>,

    /// Short description shown in catalog summaries.
    pub description: String,

    /// Descriptor version string.
    pub version: String,

    /// Entry reference handed to the unit loader.
    pub entry: String,

    /// Max run time in whole seconds; must be ≥ 1.
    pub timeout_seconds: u64,

    /// What to do on timeout. Only `"return"` (cooperative cancellation)
    /// is valid; there is no forced termination.
    pub timeout_behavior: TimeoutBehavior,

    /// Unit needs network access.
    pub requires_network: bool,

    /// Unit needs the speaker.
    pub requires_audio: bool,

    /// Free-form classification tags.
    pub tags: Vec<String>,

    /// Unit-specific config, passed through the capability object
    /// (merged with stored runtime overrides).
    pub config: Map<String, Value>,

    /// Secret / env-var keys the unit needs; checked non-fatally at scan.
    pub required_secrets: Vec<String>,
}

/// Timeout behavior. A closed single-variant enum: deprecated wire values
/// are normalized by the migration pass, anything else fails the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TimeoutBehavior {
    /// Set the stop token and expect the unit to return promptly.
    #[serde(rename = "return")]
    Return,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            name: None,
            description: String::new(),
            version: "1.0.0".to_string(),
            entry: "main".to_string(),
            timeout_seconds: 120,
            timeout_behavior: TimeoutBehavior::Return,
            requires_network: false,
            requires_audio: false,
            tags: Vec::new(),
            config: Map::new(),
            required_secrets: Vec::new(),
        }
    }
}

impl Descriptor {
    /// Runs the full parse pipeline on a raw JSON value.
    pub fn from_value(raw: &Value) -> Result<Self, CatalogError> {
        let migrated = migrate(raw);
        let descriptor: Descriptor = serde_json::from_value(migrated)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Runs the full parse pipeline on descriptor file contents.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Semantic checks that the schema cannot express.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.timeout_seconds < 1 {
            return Err(CatalogError::Invalid(
                "timeout_seconds must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Display name to show on screens: `name`, or the unit id.
    pub fn effective_display_name<'a>(&'a self, unit_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(unit_id)
    }

    /// Run budget as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Applies legacy key renames/strips and value normalization.
///
/// Returns a new value; the input is not mutated. Renames only apply when
/// the new key is absent, so a descriptor carrying both keeps the new one.
fn migrate(raw: &Value) -> Value {
    let Some(obj) = raw.as_object() else {
        return raw.clone();
    };
    let mut out = obj.clone();

    for (old, new) in LEGACY_RENAMES {
        if out.contains_key(old) && !out.contains_key(new) {
            if let Some(v) = out.remove(old) {
                out.insert(new.to_string(), v);
            }
        } else {
            out.remove(old);
        }
    }
    for key in LEGACY_STRIPPED {
        out.remove(key);
    }

    // Deprecated timeout_behavior spellings collapse to "return".
    if let Some(behavior) = out.get_mut("timeout_behavior") {
        if matches!(behavior.as_str(), Some("kill") | Some("force_return")) {
            *behavior = Value::String("return".to_string());
        }
    }

    Value::Object(out)
}
