//! Client configuration at `~/.relay/config.toml`.
//!
//! Provides the default origin, token, session command, scrollback size, and
//! retry settings. CLI flags always override config file values.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use relay_client::{ConnectConfig, OrchestratorConfig, RetryPolicy};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,

    /// Handshake retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Origin the terminal URL is derived from.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Bearer token for the upgrade request (empty = none).
    #[serde(default)]
    pub token: String,

    /// Command to start on the host (empty = host default).
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Bytes of output kept per session.
    #[serde(default = "default_scrollback")]
    pub scrollback: usize,

    /// Seconds to wait for the channel to open (0 = no limit).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            token: String::new(),
            command: default_command(),
            scrollback: default_scrollback(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// `[retry]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_command() -> Vec<String> {
    vec!["/bin/bash".to_string()]
}

fn default_scrollback() -> usize {
    relay_client::scrollback::DEFAULT_SCROLLBACK_BYTES
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    8000
}

/// Values given on the command line, which win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub origin: Option<String>,
    pub token: Option<String>,
    pub command: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn origin(&self, overrides: &Overrides) -> String {
        overrides
            .origin
            .clone()
            .unwrap_or_else(|| self.default.origin.clone())
    }

    /// WebSocket connector settings.
    pub fn connect_config(&self, overrides: &Overrides) -> ConnectConfig {
        let token = overrides
            .token
            .clone()
            .unwrap_or_else(|| self.default.token.clone());
        ConnectConfig {
            token: non_empty(token),
            timeout_secs: self.default.connect_timeout_secs,
        }
    }

    /// Orchestrator settings.
    pub fn orchestrator_config(&self, overrides: &Overrides) -> OrchestratorConfig {
        let command = overrides
            .command
            .clone()
            .unwrap_or_else(|| self.default.command.clone());
        OrchestratorConfig {
            origin: self.origin(overrides),
            command: if command.is_empty() { None } else { Some(command) },
            scrollback_bytes: self.default.scrollback,
            retry: self.retry_policy(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.default.origin, "http://localhost:8080");
        assert!(cfg.default.token.is_empty());
        assert_eq!(cfg.default.command, vec!["/bin/bash"]);
        assert_eq!(cfg.default.scrollback, 256 * 1024);
        assert_eq!(cfg.default.connect_timeout_secs, 10);
        assert_eq!(cfg.retry.max_attempts, 1);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[default]
origin = "https://relay.example.com"
token = "s3cret"
command = ["/usr/bin/zsh", "-l"]
scrollback = 4096
connect_timeout_secs = 3

[retry]
max_attempts = 4
initial_backoff_ms = 100
max_backoff_ms = 1000
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.default.origin, "https://relay.example.com");
        assert_eq!(cfg.default.token, "s3cret");
        assert_eq!(cfg.default.command, vec!["/usr/bin/zsh", "-l"]);
        assert_eq!(cfg.default.scrollback, 4096);
        assert_eq!(cfg.default.connect_timeout_secs, 3);

        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(1));
    }

    #[test]
    fn parse_partial_toml_config() {
        let toml_str = r#"
[default]
origin = "http://10.0.0.5:3000"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.default.origin, "http://10.0.0.5:3000");
        assert_eq!(cfg.default.command, vec!["/bin/bash"]); // default
        assert_eq!(cfg.retry.max_backoff_ms, 8000); // default
    }

    #[test]
    fn flags_override_file() {
        let cfg: Config = toml::from_str(
            r#"
[default]
origin = "http://file.example"
token = "from-file"
"#,
        )
        .unwrap();
        let overrides = Overrides {
            origin: Some("https://flag.example".into()),
            token: Some("from-flag".into()),
            command: Some(vec!["top".into()]),
        };

        let orch = cfg.orchestrator_config(&overrides);
        assert_eq!(orch.origin, "https://flag.example");
        assert_eq!(orch.command, Some(vec!["top".to_string()]));
        assert_eq!(cfg.connect_config(&overrides).token.as_deref(), Some("from-flag"));
    }

    #[test]
    fn empty_values_mean_unset() {
        let cfg: Config = toml::from_str(
            r#"
[default]
token = ""
command = []
"#,
        )
        .unwrap();
        let overrides = Overrides::default();
        assert_eq!(cfg.connect_config(&overrides).token, None);
        assert_eq!(cfg.orchestrator_config(&overrides).command, None);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.default.origin, "http://localhost:8080");
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[default]\norigin = 42\n").unwrap();
        let err = Config::load(path.to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }
}
