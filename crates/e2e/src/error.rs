//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Port {0} is already in use and reuse of an existing server is disabled")]
    PortInUse(u16),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Selector '{selector}' matched {count} elements, expected exactly one")]
    ElementNotFound { selector: String, count: usize },

    #[error("Text of '{selector}' did not stabilise within {timeout_ms} ms (last seen: {last_text:?})")]
    ResultTimeout {
        selector: String,
        timeout_ms: u64,
        last_text: Option<String>,
    },

    #[error("Step '{step}' timed out after {timeout_ms} ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<chromiumoxide::error::CdpError> for E2eError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        E2eError::Browser(e.to_string())
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
