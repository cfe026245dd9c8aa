//! Headless Chromium sessions over the DevTools protocol

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{PageDriver, SessionFactory};
use crate::error::{E2eError, E2eResult};

/// Configuration for launching Chromium
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromiumConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Browser binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    /// Pass `--no-sandbox` (needed when running as root in containers)
    pub no_sandbox: bool,
    /// Bound on a single DevTools request
    pub request_timeout_ms: u64,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            executable: None,
            no_sandbox: false,
            request_timeout_ms: 30_000,
        }
    }
}

/// Launches one browser process per session, each with a throwaway profile
/// directory so cookies and storage never carry over
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    config: ChromiumConfig,
}

impl ChromiumFactory {
    pub fn new(config: ChromiumConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn open(&self) -> E2eResult<Box<dyn PageDriver>> {
        let session = ChromiumSession::launch(&self.config).await?;
        Ok(Box::new(session))
    }
}

/// A browser process driving a single page
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl ChromiumSession {
    pub async fn launch(config: &ChromiumConfig) -> E2eResult<Self> {
        let profile = tempfile::Builder::new()
            .prefix("authflow-profile-")
            .tempdir()?;

        let mut builder = BrowserConfig::builder()
            .window_size(config.window_width, config.window_height)
            .user_data_dir(profile.path())
            .request_timeout(Duration::from_millis(config.request_timeout_ms));
        if !config.headless {
            builder = builder.with_head();
        }
        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(E2eError::Browser)?;

        debug!(profile = %profile.path().display(), "Launching browser");
        let (browser, mut events) = Browser::launch(browser_config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!("Browser event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        info!("Browser session ready");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            _profile: profile,
        })
    }

    /// Evaluate `expression` and decode its JSON-serialised result
    ///
    /// Results travel as a JSON string so that `null` survives the round trip.
    async fn eval<T: DeserializeOwned>(&self, expression: &str) -> E2eResult<T> {
        let wrapped = format!("JSON.stringify(({}) ?? null)", expression);
        let json: String = self.page.evaluate(wrapped).await?.into_value()?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Quote a Rust string as a JavaScript string literal
fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl PageDriver for ChromiumSession {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| E2eError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        // Chromium reports unreachable hosts by loading its own error page
        let location: String = self.eval("window.location.href").await?;
        if location.starts_with("chrome-error://") {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "page could not be loaded".to_string(),
            });
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        self.eval(&format!(
            "document.querySelectorAll({}).length",
            js_str(selector)
        ))
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.focus();
                el.value = {value};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            selector = js_str(selector),
            value = js_str(value),
        );
        if self.eval::<bool>(&script).await? {
            Ok(())
        } else {
            Err(E2eError::ElementNotFound {
                selector: selector.to_string(),
                count: 0,
            })
        }
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            selector = js_str(selector),
        );
        if self.eval::<bool>(&script).await? {
            Ok(())
        } else {
            Err(E2eError::ElementNotFound {
                selector: selector.to_string(),
                count: 0,
            })
        }
    }

    async fn text(&self, selector: &str) -> E2eResult<Option<String>> {
        self.eval(&format!(
            "document.querySelector({})?.textContent",
            js_str(selector)
        ))
        .await
    }

    async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>> {
        self.eval(&format!("window.localStorage.getItem({})", js_str(key)))
            .await
    }

    async fn close(&self) -> E2eResult<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        Ok(())
    }
}
