//! Error types used by the slotvisor runtime and units.
//!
//! This module defines the error enums for each failure domain:
//!
//! - [`UnitError`] — errors raised by unit loading and execution.
//! - [`HandlerError`] — errors raised by bus event handlers.
//! - [`CatalogError`] — descriptor and selector-map parse failures.
//! - [`ConfigError`] — system config / secrets / overrides I/O failures.
//!
//! Most of these are *contained* failures: an invalid descriptor is logged
//! and skipped, a failing handler is unsubscribed, a crashing unit becomes
//! a `system.unit.error` event. None of them propagate into the consumer
//! loop as a panic.

use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced by unit loading and execution.
///
/// A unit entry returns `Result<(), UnitError>`. The runner converts both
/// the `Err` case and a worker-thread panic into a `system.unit.error`
/// lifecycle event; neither crashes the supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum UnitError {
    /// The loader could not produce an entry for the unit.
    #[error("cannot load unit '{unit}': {reason}")]
    Load {
        /// Unit identifier as requested from the loader.
        unit: String,
        /// Why the entry could not be bound.
        reason: String,
    },

    /// The unit body failed while running.
    #[error("unit execution failed: {0}")]
    Failed(String),
}

impl UnitError {
    /// Returns a short stable label (snake_case) for use in logs and event payloads.
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::Load { .. } => "unit_load",
            UnitError::Failed(_) => "unit_failed",
        }
    }
}

/// # Error returned by a bus event handler.
///
/// A handler that returns this (or panics) is logged and **permanently
/// unsubscribed**; other handlers for the same event keep firing.
#[derive(Error, Debug)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Convenience constructor from anything displayable.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

/// # Per-unit catalog failures.
///
/// Raised while parsing one descriptor or the selector map. The scan logs
/// these and continues; they never fail the scan as a whole.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Descriptor file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Descriptor or selector-map JSON is malformed or violates the schema.
    #[error("invalid descriptor: {0}")]
    Parse(#[from] serde_json::Error),

    /// Descriptor parsed but failed semantic validation.
    #[error("invalid descriptor: {0}")]
    Invalid(String),
}

/// # System configuration failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read or written.
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON or violates the schema.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
