//! Scenario driver
//!
//! Reproduces one form interaction against a live page and reports what the
//! page showed. Each run moves through [`RunState`] strictly in order; when a
//! step fails, the state reached so far tells "page never loaded" apart from
//! "submitted but no response" and from "responded with the wrong text".

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{bounded, Locator, PageDriver};
use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::spec::{AuxiliaryCheck, Scenario};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Navigated,
    FieldsFilled,
    Submitted,
    ResultStable,
    Evaluated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotStarted => "not started",
            RunState::Navigated => "navigated",
            RunState::FieldsFilled => "fields filled",
            RunState::Submitted => "submitted",
            RunState::ResultStable => "result stable",
            RunState::Evaluated => "evaluated",
        };
        f.write_str(name)
    }
}

/// What the page showed once its result message settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedOutcome {
    pub result_text: String,
    /// `None` when the scenario declares no auxiliary check
    pub auxiliary_present: Option<bool>,
}

/// Failure classification used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    ElementNotFound,
    ResultTimeout,
    StepTimeout,
    AssertionMismatch,
    Browser,
}

impl From<&E2eError> for FailureKind {
    fn from(e: &E2eError) -> Self {
        match e {
            E2eError::Navigation { .. } => FailureKind::Navigation,
            E2eError::ElementNotFound { .. } => FailureKind::ElementNotFound,
            E2eError::ResultTimeout { .. } => FailureKind::ResultTimeout,
            E2eError::StepTimeout { .. } => FailureKind::StepTimeout,
            _ => FailureKind::Browser,
        }
    }
}

/// A run that stopped before producing an outcome
#[derive(Debug)]
pub struct ScenarioFailure {
    pub furthest: RunState,
    pub error: E2eError,
}

impl ScenarioFailure {
    pub fn kind(&self) -> FailureKind {
        FailureKind::from(&self.error)
    }
}

impl fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reached: {})", self.error, self.furthest)
    }
}

/// Drives scenarios on one page
pub struct ScenarioDriver<'a> {
    page: &'a dyn PageDriver,
    config: &'a HarnessConfig,
}

impl<'a> ScenarioDriver<'a> {
    pub fn new(page: &'a dyn PageDriver, config: &'a HarnessConfig) -> Self {
        Self { page, config }
    }

    /// Execute `scenario` within the scenario-wide timeout
    pub async fn run(&self, scenario: &Scenario) -> Result<ObservedOutcome, ScenarioFailure> {
        let mut state = RunState::NotStarted;
        let limit = self.config.timeouts.scenario();

        let result = tokio::time::timeout(limit, self.run_steps(scenario, &mut state)).await;
        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(error)) => Err(ScenarioFailure {
                furthest: state,
                error,
            }),
            Err(_) => Err(ScenarioFailure {
                furthest: state,
                error: E2eError::StepTimeout {
                    step: format!("scenario:{}", scenario.name),
                    timeout_ms: limit.as_millis() as u64,
                },
            }),
        }
    }

    async fn run_steps(&self, scenario: &Scenario, state: &mut RunState) -> E2eResult<ObservedOutcome> {
        let timeouts = &self.config.timeouts;
        let poll = timeouts.poll_interval();

        let url = self.config.url_for(&scenario.target_path);
        bounded("navigate", timeouts.navigation(), self.page.goto(&url))
            .await
            .map_err(|e| match e {
                E2eError::Navigation { .. } => e,
                other => E2eError::Navigation {
                    url: url.clone(),
                    reason: other.to_string(),
                },
            })?;
        advance(scenario, state, RunState::Navigated);

        for field in &scenario.fields {
            Locator::new(self.page, &field.selector)
                .fill(&field.value, timeouts.action(), poll)
                .await?;
        }
        advance(scenario, state, RunState::FieldsFilled);

        Locator::new(self.page, &scenario.submit_selector)
            .click(timeouts.action(), poll)
            .await?;
        advance(scenario, state, RunState::Submitted);

        let result_text = Locator::new(self.page, &scenario.result_selector)
            .wait_for_stable_text(timeouts.result(), poll)
            .await?;
        advance(scenario, state, RunState::ResultStable);

        let auxiliary_present = match &scenario.auxiliary {
            Some(check) => Some(self.check_auxiliary(check).await?),
            None => None,
        };

        Ok(ObservedOutcome {
            result_text,
            auxiliary_present,
        })
    }

    async fn check_auxiliary(&self, check: &AuxiliaryCheck) -> E2eResult<bool> {
        match check {
            AuxiliaryCheck::LocalStorage { key, .. } => {
                let value = bounded(
                    &format!("local_storage:{}", key),
                    self.config.timeouts.action(),
                    self.page.local_storage_item(key),
                )
                .await?;
                Ok(value.is_some())
            }
        }
    }
}

fn advance(scenario: &Scenario, state: &mut RunState, next: RunState) {
    debug!(scenario = %scenario.name, from = %state, to = %next, "state transition");
    *state = next;
}

/// Run one scenario on `page`
pub async fn run_scenario(
    page: &dyn PageDriver,
    config: &HarnessConfig,
    scenario: &Scenario,
) -> Result<ObservedOutcome, ScenarioFailure> {
    ScenarioDriver::new(page, config).run(scenario).await
}
