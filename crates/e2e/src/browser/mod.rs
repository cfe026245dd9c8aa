//! Browser automation seam
//!
//! [`PageDriver`] is the narrow set of page operations the scenario driver
//! needs. [`SessionFactory`] opens a page in a fresh browser session. The
//! Chromium implementation lives in [`chromium`]; tests substitute an
//! in-memory page.
//!
//! [`Locator`] wraps a selector with the "exactly one element" rule and the
//! bounded waits, so callers never see raw selector resolution.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{E2eError, E2eResult};

pub mod chromium;

pub use chromium::{ChromiumConfig, ChromiumFactory};

/// Operations on one open page
///
/// Selectors are CSS selectors. `fill`, `click` and `text` act on the first
/// match; [`Locator`] checks the match count before calling them.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait for the navigation to finish
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Number of elements matching `selector`
    async fn count(&self, selector: &str) -> E2eResult<usize>;

    /// Set the value of a form control and fire `input`/`change`
    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    /// `textContent` of the element, `None` when it does not exist
    async fn text(&self, selector: &str) -> E2eResult<Option<String>>;

    /// `localStorage.getItem(key)`
    async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>>;

    /// Release the session behind this page
    async fn close(&self) -> E2eResult<()> {
        Ok(())
    }
}

/// Opens pages, each in its own browser session
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> E2eResult<Box<dyn PageDriver>>;
}

/// Run `fut` with a deadline, reporting `step` on expiry
pub async fn bounded<T, F>(step: &str, timeout: Duration, fut: F) -> E2eResult<T>
where
    F: Future<Output = E2eResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(E2eError::StepTimeout {
            step: step.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// A selector bound to a page
pub struct Locator<'a> {
    page: &'a dyn PageDriver,
    selector: &'a str,
}

impl<'a> Locator<'a> {
    pub fn new(page: &'a dyn PageDriver, selector: &'a str) -> Self {
        Self { page, selector }
    }

    /// Wait until the selector matches exactly one element
    ///
    /// Zero matches are polled until `timeout`; more than one fails at once
    /// since waiting will not make an ambiguous selector unique.
    pub async fn resolve_one(&self, timeout: Duration, poll: Duration) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let count = bounded(
                &format!("count:{}", self.selector),
                deadline.saturating_duration_since(Instant::now()),
                self.page.count(self.selector),
            )
            .await?;

            match count {
                1 => return Ok(()),
                0 if Instant::now() + poll < deadline => {
                    tokio::time::sleep(poll).await;
                }
                n => return Err(self.not_found(n)),
            }
        }
    }

    pub async fn fill(&self, value: &str, timeout: Duration, poll: Duration) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        self.resolve_one(timeout, poll).await?;
        bounded(
            &format!("fill:{}", self.selector),
            deadline.saturating_duration_since(Instant::now()),
            self.page.fill(self.selector, value),
        )
        .await
    }

    pub async fn click(&self, timeout: Duration, poll: Duration) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        self.resolve_one(timeout, poll).await?;
        bounded(
            &format!("click:{}", self.selector),
            deadline.saturating_duration_since(Instant::now()),
            self.page.click(self.selector),
        )
        .await
    }

    /// Poll the element's text until it is non-empty and unchanged across two
    /// consecutive polls
    pub async fn wait_for_stable_text(&self, timeout: Duration, poll: Duration) -> E2eResult<String> {
        let deadline = Instant::now() + timeout;
        let mut previous: Option<String> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let current = match tokio::time::timeout(remaining, self.observe_text()).await {
                Ok(result) => result?,
                Err(_) => return Err(self.unstable(timeout, previous)),
            };
            trace!(selector = self.selector, text = ?current, "polled result text");

            if let Some(text) = &current {
                if previous.as_ref() == Some(text) {
                    return Ok(text.clone());
                }
            }
            previous = current;

            if Instant::now() + poll >= deadline {
                return Err(self.unstable(timeout, previous));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Trimmed non-empty text of the single match
    async fn observe_text(&self) -> E2eResult<Option<String>> {
        match self.page.count(self.selector).await? {
            0 => Ok(None),
            1 => Ok(self
                .page
                .text(self.selector)
                .await?
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())),
            n => Err(self.not_found(n)),
        }
    }

    fn not_found(&self, count: usize) -> E2eError {
        E2eError::ElementNotFound {
            selector: self.selector.to_string(),
            count,
        }
    }

    fn unstable(&self, timeout: Duration, last_text: Option<String>) -> E2eError {
        E2eError::ResultTimeout {
            selector: self.selector.to_string(),
            timeout_ms: timeout.as_millis() as u64,
            last_text,
        }
    }
}
