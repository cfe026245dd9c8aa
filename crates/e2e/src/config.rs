//! Harness configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! or missing file yields a working setup against `http://127.0.0.1:8000`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::browser::ChromiumConfig;
use crate::error::{E2eError, E2eResult};
use crate::server::ServerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Origin the target paths are resolved against
    pub base_url: String,

    pub server: ServerConfig,

    pub browser: ChromiumConfig,

    pub timeouts: TimeoutConfig,

    pub run: RunConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            server: ServerConfig::default(),
            browser: ChromiumConfig::default(),
            timeouts: TimeoutConfig::default(),
            run: RunConfig::default(),
        }
    }
}

/// Per-step bounds, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub navigation_ms: u64,
    /// Locating, filling and clicking one element
    pub action_ms: u64,
    /// Waiting for the result text to settle
    pub result_ms: u64,
    pub poll_interval_ms: u64,
    /// Whole scenario, from navigation to evaluation
    pub scenario_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: 10_000,
            action_ms: 5_000,
            result_ms: 10_000,
            poll_interval_ms: 100,
            scenario_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn result(&self) -> Duration {
        Duration::from_millis(self.result_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_millis(self.scenario_ms)
    }
}

/// How scenarios share browser state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Fresh browser session per scenario
    #[default]
    Isolated,
    /// One session for the whole run, scenarios strictly sequential
    Shared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub isolation: Isolation,
    /// Upper bound on concurrently running isolated scenarios
    pub workers: usize,
    /// Where `test-results.json` is written
    pub output_dir: PathBuf,
    /// YAML suites to run instead of the built-in flow
    pub specs_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            isolation: Isolation::Isolated,
            workers: 1,
            output_dir: PathBuf::from("test-results"),
            specs_dir: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> E2eResult<()> {
        let url = self.parsed_base_url()?;
        if self.server.enabled && url.port_or_known_default() != Some(self.server.port) {
            return Err(E2eError::Config(format!(
                "base_url '{}' does not use server.port {}",
                self.base_url, self.server.port
            )));
        }
        if self.run.workers == 0 {
            return Err(E2eError::Config("run.workers must be at least 1".into()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::Config(
                "timeouts.poll_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Point the server and the base URL at `port` together
    pub fn set_port(&mut self, port: u16) -> E2eResult<()> {
        let mut url = self.parsed_base_url()?;
        url.set_port(Some(port)).map_err(|_| {
            E2eError::Config(format!("base_url '{}' cannot take a port", self.base_url))
        })?;
        self.base_url = url.as_str().trim_end_matches('/').to_string();
        self.server.port = port;
        Ok(())
    }

    fn parsed_base_url(&self) -> E2eResult<Url> {
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
            _ => Err(E2eError::Config(format!(
                "base_url must be an http(s) origin, got '{}'",
                self.base_url
            ))),
        }
    }

    /// Resolve a page path against the base URL
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
