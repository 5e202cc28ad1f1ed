//! Process-wide configuration.
//!
//! Built-in defaults are overridden by an optional JSON file. A missing or
//! unreadable file, or one that is not a JSON object, leaves the defaults in
//! place. A single bad value only resets its own key. Either way the problem
//! is logged and startup continues.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where the engine writes its report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Report is read from the engine's standard output.
    #[default]
    Stdout,
    /// Report is written by the engine to `--output <file>` and read back.
    File,
}

/// Configuration shared by every request for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValigatorConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Prefix of the validate route, e.g. `/valigator`.
    pub base_path: String,
    /// Default for the `errors-only` query parameter.
    pub display_only_failures: bool,
    /// Rule ids passed to the engine as `--skip-rule` on every request.
    pub skip_rules: Vec<String>,
    /// Fixed rule set catalog. When non-empty, `rule_sets_dir` is not scanned.
    pub rule_sets: Vec<String>,
    /// Directory enumerated for rule set files.
    pub rule_sets_dir: PathBuf,
    /// Engine executable, looked up on `PATH` when not absolute.
    pub spectral_path: PathBuf,
    pub output_mode: OutputMode,
    /// Directory receiving staged documents and engine output files.
    pub staging_dir: PathBuf,
    /// Engine deadline in seconds; `null` waits forever.
    pub lint_timeout_secs: Option<u64>,
    /// Upper bound on concurrently running engine processes; `null` or `0` is unbounded.
    pub max_concurrent_lints: Option<usize>,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ValigatorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8081,
            base_path: String::new(),
            display_only_failures: false,
            skip_rules: Vec::new(),
            rule_sets: Vec::new(),
            rule_sets_dir: PathBuf::from("./rulesets"),
            spectral_path: PathBuf::from("spectral"),
            output_mode: OutputMode::Stdout,
            staging_dir: std::env::temp_dir(),
            lint_timeout_secs: Some(120),
            max_concurrent_lints: None,
            max_body_bytes: 10_485_760,
        }
    }
}

impl ValigatorConfig {
    /// Load configuration from `path`, falling back to defaults.
    ///
    /// Never fails: an absent file, an unreadable file and malformed JSON all
    /// yield the built-in defaults, with the reason logged.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unable to load config file, using defaults");
                return Self::default();
            }
        };
        Self::from_json_bytes(&bytes)
    }

    /// Parse configuration from JSON bytes, keeping defaults for absent keys.
    ///
    /// Empty input and malformed JSON yield the defaults. A key whose value
    /// has the wrong type or is out of range is logged by name and keeps its
    /// default; the remaining keys still apply.
    #[must_use]
    pub fn from_json_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        let object = match serde_json::from_slice::<Map<String, Value>>(bytes) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    content = %String::from_utf8_lossy(bytes),
                    "Unable to deserialize json config, using defaults"
                );
                return Self::default();
            }
        };
        serde_json::from_value(Value::Object(object.clone()))
            .unwrap_or_else(|_| Self::from_valid_keys(object))
    }

    /// Apply only the keys that deserialize on their own.
    fn from_valid_keys(object: Map<String, Value>) -> Self {
        let mut accepted = Map::new();
        for (key, value) in object {
            let single: Map<String, Value> = [(key.clone(), value.clone())].into_iter().collect();
            match serde_json::from_value::<Self>(Value::Object(single)) {
                Ok(_) => {
                    accepted.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!(key = %key, value = %value, error = %e, "Invalid config value, using default");
                }
            }
        }
        serde_json::from_value(Value::Object(accepted)).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unable to apply json config, using defaults");
            Self::default()
        })
    }

    /// `host:port` string the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base path normalised to either `""` or `/segment[/segment...]` without a
    /// trailing slash.
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    #[must_use]
    pub fn lint_timeout(&self) -> Option<Duration> {
        self.lint_timeout_secs.map(Duration::from_secs)
    }
}
