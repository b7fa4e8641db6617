//! Thread-safe secrets store with lazy file loading.
//!
//! Resolution precedence: process env → secrets file → caller default.
//!
//! The secrets file is located by checking (in order):
//! 1. the `SLOTVISOR_SECRETS_FILE` environment variable
//! 2. `secrets/secrets.env` (working directory)
//! 3. `/etc/slotvisor/secrets.env`
//!
//! File format: `KEY=VALUE` lines. `#` comments and blank lines are
//! ignored; surrounding quotes on values are stripped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, info, warn};

const ENV_OVERRIDE: &str = "SLOTVISOR_SECRETS_FILE";
const DEFAULT_PATHS: [&str; 2] = ["secrets/secrets.env", "/etc/slotvisor/secrets.env"];

/// Lazy-loaded secrets store. The file is parsed at most once, on first
/// lookup that misses the environment.
pub struct Secrets {
    file: Option<PathBuf>,
    store: OnceLock<HashMap<String, String>>,
}

impl Secrets {
    /// Store using the conventional file resolution order.
    pub fn new() -> Self {
        Self {
            file: None,
            store: OnceLock::new(),
        }
    }

    /// Store backed by an explicit file (tests, embedded setups).
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            store: OnceLock::new(),
        }
    }

    /// Returns the value for `key`, or `default`.
    ///
    /// A real environment variable always wins over the file.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.resolve(key).unwrap_or_else(|| default.to_string())
    }

    /// Returns the value for `key` if it resolves anywhere.
    pub fn resolve(&self, key: &str) -> Option<String> {
        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }
        self.loaded().get(key).cloned()
    }

    /// True if `key` resolves to a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        self.resolve(key).is_some_and(|v| !v.is_empty())
    }

    fn loaded(&self) -> &HashMap<String, String> {
        self.store.get_or_init(|| {
            let Some(path) = self.resolve_path() else {
                debug!("no secrets file found, only the environment will be used");
                return HashMap::new();
            };
            info!("loading secrets from {}", path.display());
            match std::fs::read_to_string(&path) {
                Ok(raw) => parse_env_file(&raw, &path),
                Err(err) => {
                    warn!("cannot read secrets file {}: {}", path.display(), err);
                    HashMap::new()
                }
            }
        })
    }

    fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(explicit) = &self.file {
            return Some(explicit.clone());
        }
        if let Ok(explicit) = std::env::var(ENV_OVERRIDE) {
            let path = PathBuf::from(&explicit);
            if path.is_file() {
                return Some(path);
            }
            warn!("{ENV_OVERRIDE}={explicit} does not exist");
            return None;
        }
        DEFAULT_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    }
}

impl Default for Secrets {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a simple `KEY=VALUE` env file, warning on malformed lines.
fn parse_env_file(raw: &str, path: &Path) -> HashMap<String, String> {
    let mut store = HashMap::new();
    for (lineno, raw_line) in raw.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!(
                "ignoring malformed line {} in {}",
                lineno + 1,
                path.display()
            );
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        store.insert(key.trim().to_string(), value.to_string());
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn secrets_file(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.env");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn file_values_parse_with_comments_and_quotes() {
        let (_dir, path) = secrets_file(
            "# comment\n\nAPI_KEY=abc123\nQUOTED=\"hello world\"\nmalformed line\n",
        );
        let secrets = Secrets::with_file(path);

        assert_eq!(secrets.get("API_KEY", ""), "abc123");
        assert_eq!(secrets.get("QUOTED", ""), "hello world");
        assert_eq!(secrets.get("MISSING", "fallback"), "fallback");
        assert!(secrets.has("API_KEY"));
        assert!(!secrets.has("MISSING"));
    }

    #[test]
    fn environment_wins_over_file() {
        let (_dir, path) = secrets_file("SLOTVISOR_TEST_PRECEDENCE=from_file\n");
        std::env::set_var("SLOTVISOR_TEST_PRECEDENCE", "from_env");
        let secrets = Secrets::with_file(path);

        assert_eq!(secrets.get("SLOTVISOR_TEST_PRECEDENCE", ""), "from_env");
        std::env::remove_var("SLOTVISOR_TEST_PRECEDENCE");
    }

    #[test]
    fn missing_file_is_not_fatal() {
        let secrets = Secrets::with_file("/nope/secrets.env");
        assert_eq!(secrets.get("ANYTHING_AT_ALL", "d"), "d");
    }
}
