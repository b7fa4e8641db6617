//! Unit entry loading.
//!
//! A [`UnitLoader`] turns a catalog record into a fresh, runnable
//! [`UnitEntry`] at launch time. Loading is per-launch on purpose: every run
//! gets a newly constructed entry, so no state leaks between consecutive
//! runs of the same unit.
//!
//! [`FactoryLoader`] is the in-process implementation: units are registered
//! as factory closures keyed by unit id, with a fallback lookup on the
//! descriptor's `entry` field so several catalog entries can share one
//! implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::capability::Capability;
use crate::catalog::Descriptor;
use crate::error::UnitError;
use crate::runner::StopToken;

/// A unit's entry point, consumed by exactly one run.
///
/// Runs on a dedicated worker thread. The entry must poll or wait on the
/// [`StopToken`] and return promptly once it is cancelled.
pub type UnitEntry = Box<dyn FnOnce(StopToken, Capability) -> Result<(), UnitError> + Send + 'static>;

/// Factory producing a fresh [`UnitEntry`] per launch.
pub type UnitFactory = Arc<dyn Fn() -> UnitEntry + Send + Sync>;

/// Resolves a catalog record to a runnable entry.
pub trait UnitLoader: Send + Sync {
    /// Builds a fresh entry for one run of `unit_id`.
    fn load(
        &self,
        unit_id: &str,
        unit_dir: &Path,
        descriptor: &Descriptor,
    ) -> Result<UnitEntry, UnitError>;
}

/// Registry-backed loader for units compiled into the host binary.
#[derive(Default)]
pub struct FactoryLoader {
    factories: Mutex<HashMap<String, UnitFactory>>,
}

impl FactoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a key. The key is matched against the unit
    /// id first, then against the descriptor's `entry` field.
    pub fn register<F>(&self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> UnitEntry + Send + Sync + 'static,
    {
        let key = key.into();
        debug!("registered unit factory {key:?}");
        if let Ok(mut factories) = self.factories.lock() {
            factories.insert(key, Arc::new(factory));
        }
    }
}

impl UnitLoader for FactoryLoader {
    fn load(
        &self,
        unit_id: &str,
        _unit_dir: &Path,
        descriptor: &Descriptor,
    ) -> Result<UnitEntry, UnitError> {
        let factory = {
            let factories = self.factories.lock().map_err(|_| UnitError::Load {
                unit: unit_id.to_string(),
                reason: "loader registry poisoned".to_string(),
            })?;
            factories
                .get(unit_id)
                .or_else(|| factories.get(descriptor.entry.as_str()))
                .cloned()
        };
        match factory {
            Some(factory) => Ok(factory()),
            None => Err(UnitError::Load {
                unit: unit_id.to_string(),
                reason: format!("no factory registered for entry {:?}", descriptor.entry),
            }),
        }
    }
}
