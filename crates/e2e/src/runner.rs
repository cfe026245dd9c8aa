//! Main test runner that orchestrates the server, browser sessions and
//! scenario evaluation

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::assertion::{evaluate, Verdict};
use crate::browser::{PageDriver, SessionFactory};
use crate::config::{HarnessConfig, Isolation};
use crate::driver::{FailureKind, ObservedOutcome, RunState, ScenarioDriver, ScenarioFailure};
use crate::error::E2eResult;
use crate::identity::SessionIdentity;
use crate::server::ServerHandle;
use crate::spec::{Scenario, ScenarioSuite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub furthest_state: RunState,
    pub failure_kind: Option<FailureKind>,
    pub failure_reason: Option<String>,
    pub observed: Option<ObservedOutcome>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    fn evaluated(verdict: Verdict, observed: ObservedOutcome, duration_ms: u64) -> Self {
        Self {
            name: verdict.scenario_name,
            status: if verdict.passed {
                ScenarioStatus::Passed
            } else {
                ScenarioStatus::Failed
            },
            furthest_state: RunState::Evaluated,
            failure_kind: (!verdict.passed).then_some(FailureKind::AssertionMismatch),
            failure_reason: verdict.failure_reason,
            observed: Some(observed),
            duration_ms,
        }
    }

    fn failed(scenario: &Scenario, failure: ScenarioFailure, duration_ms: u64) -> Self {
        Self {
            name: scenario.name.clone(),
            status: ScenarioStatus::Failed,
            furthest_state: failure.furthest,
            failure_kind: Some(failure.kind()),
            failure_reason: Some(failure.error.to_string()),
            observed: None,
            duration_ms,
        }
    }

    fn skipped(scenario: &Scenario, reason: String) -> Self {
        Self {
            name: scenario.name.clone(),
            status: ScenarioStatus::Skipped,
            furthest_state: RunState::NotStarted,
            failure_kind: None,
            failure_reason: Some(reason),
            observed: None,
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub identity: SessionIdentity,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: HarnessConfig,

    /// Opens browser sessions
    sessions: Arc<dyn SessionFactory>,

    /// Running server handle (if any)
    server: Option<ServerHandle>,
}

impl TestRunner {
    pub fn new(config: HarnessConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            sessions,
            server: None,
        }
    }

    /// Start or attach to the server, waiting until it is ready
    ///
    /// With server management disabled the runner only attaches, but still
    /// polls readiness before any scenario runs.
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(());
        }

        let (server_config, base_url) = (&self.config.server, &self.config.base_url);
        let server = if server_config.enabled {
            ServerHandle::start(server_config, base_url).await?
        } else {
            ServerHandle::attach(server_config, base_url).await?
        };
        self.server = Some(server);
        Ok(())
    }

    /// Stop the server if this runner launched it
    pub async fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop().await?;
        }
        Ok(())
    }

    /// Run a suite bound to `identity`
    ///
    /// Scenario failures are collected into the report; only infrastructure
    /// problems (server startup, shared session launch) return an error.
    pub async fn run_suite(
        &mut self,
        suite: &ScenarioSuite,
        identity: &SessionIdentity,
    ) -> E2eResult<SuiteReport> {
        suite.validate()?;
        let suite = suite.bind(identity);
        let start = Instant::now();

        // Ensure server is running
        self.start_server().await?;

        info!(
            "Running {} scenario(s) from '{}' (identity {})",
            suite.scenarios.len(),
            suite.name,
            identity.token()
        );

        let results = match self.config.run.isolation {
            Isolation::Shared => self.run_shared(&suite.scenarios).await?,
            Isolation::Isolated => self.run_isolated(&suite.scenarios).await,
        };

        let count = |status: ScenarioStatus| results.iter().filter(|r| r.status == status).count();
        let report = SuiteReport {
            suite: suite.name.clone(),
            identity: identity.clone(),
            total: results.len(),
            passed: count(ScenarioStatus::Passed),
            failed: count(ScenarioStatus::Failed),
            skipped: count(ScenarioStatus::Skipped),
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        };

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            report.passed, report.failed, report.skipped, report.duration_ms
        );
        Ok(report)
    }

    /// One session, scenarios in declared order
    async fn run_shared(&self, scenarios: &[Scenario]) -> E2eResult<Vec<ScenarioReport>> {
        let page = self.sessions.open().await?;
        let mut reports: Vec<ScenarioReport> = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            let report = match blocked_by(scenario, &reports) {
                Some(reason) => ScenarioReport::skipped(scenario, reason),
                None => self.execute(page.as_ref(), scenario).await,
            };
            log_report(&report);
            reports.push(report);
        }

        if let Err(e) = page.close().await {
            warn!("Failed to close shared session: {}", e);
        }
        Ok(reports)
    }

    /// A fresh session per scenario, dependency levels in order, up to
    /// `workers` scenarios of one level at a time
    async fn run_isolated(&self, scenarios: &[Scenario]) -> Vec<ScenarioReport> {
        let levels = dependency_levels(scenarios);
        let mut slots: Vec<Option<ScenarioReport>> = vec![None; scenarios.len()];

        let depth = levels.iter().copied().max().map_or(0, |d| d + 1);
        for level in 0..depth {
            let batch: Vec<usize> = (0..scenarios.len()).filter(|&i| levels[i] == level).collect();
            debug!("Level {}: {} scenario(s)", level, batch.len());

            let done: Vec<ScenarioReport> = slots.iter().flatten().cloned().collect();
            let finished: Vec<(usize, ScenarioReport)> = stream::iter(batch)
                .map(|idx| {
                    let scenario = &scenarios[idx];
                    let blocked = blocked_by(scenario, &done);
                    async move {
                        let report = match blocked {
                            Some(reason) => ScenarioReport::skipped(scenario, reason),
                            None => self.execute_isolated(scenario).await,
                        };
                        log_report(&report);
                        (idx, report)
                    }
                })
                .buffer_unordered(self.config.run.workers.max(1))
                .collect()
                .await;

            for (idx, report) in finished {
                slots[idx] = Some(report);
            }
        }

        slots.into_iter().flatten().collect()
    }

    async fn execute_isolated(&self, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();
        let page = match self.sessions.open().await {
            Ok(page) => page,
            Err(error) => {
                let failure = ScenarioFailure {
                    furthest: RunState::NotStarted,
                    error,
                };
                return ScenarioReport::failed(scenario, failure, elapsed_ms(start));
            }
        };

        let report = self.execute(page.as_ref(), scenario).await;
        if let Err(e) = page.close().await {
            warn!("Failed to close session for '{}': {}", scenario.name, e);
        }
        report
    }

    /// Drive `scenario` on `page` and evaluate the outcome
    pub async fn execute(&self, page: &dyn PageDriver, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        match ScenarioDriver::new(page, &self.config).run(scenario).await {
            Ok(observed) => {
                let verdict = evaluate(scenario, &observed);
                ScenarioReport::evaluated(verdict, observed, elapsed_ms(start))
            }
            Err(failure) => ScenarioReport::failed(scenario, failure, elapsed_ms(start)),
        }
    }

    /// Write the suite report to `<output_dir>/test-results.json`
    pub fn write_results(&self, report: &SuiteReport) -> E2eResult<PathBuf> {
        let output_dir = &self.config.run.output_dir;
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn log_report(report: &ScenarioReport) {
    let reason = report.failure_reason.as_deref().unwrap_or("unknown error");
    match report.status {
        ScenarioStatus::Passed => info!("✓ {} ({} ms)", report.name, report.duration_ms),
        ScenarioStatus::Failed => error!(
            "✗ {} [reached: {}] - {}",
            report.name, report.furthest_state, reason
        ),
        ScenarioStatus::Skipped => warn!("- {} skipped: {}", report.name, reason),
    }
}

/// Reason a scenario must not run, given the reports collected so far
fn blocked_by(scenario: &Scenario, reports: &[ScenarioReport]) -> Option<String> {
    let dep = scenario.depends_on.as_deref()?;
    match reports.iter().find(|r| r.name == dep) {
        Some(report) if report.passed() => None,
        Some(_) => Some(format!("dependency '{}' did not pass", dep)),
        None => Some(format!("dependency '{}' was not run", dep)),
    }
}

/// Level 0 for independent scenarios, one more than the dependency otherwise
///
/// Assumes a validated suite, where dependencies precede their dependents.
pub fn dependency_levels(scenarios: &[Scenario]) -> Vec<usize> {
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    let mut levels = Vec::with_capacity(scenarios.len());

    for scenario in scenarios {
        let level = scenario
            .depends_on
            .as_deref()
            .and_then(|dep| by_name.get(dep))
            .map_or(0, |&l| l + 1);
        by_name.insert(scenario.name.as_str(), level);
        levels.push(level);
    }
    levels
}

/// Render a human-readable summary of failing and skipped scenarios
pub fn failure_summary(report: &SuiteReport) -> Vec<String> {
    report
        .results
        .iter()
        .filter(|r| !r.passed())
        .map(|r| {
            format!(
                "{} [{:?}, reached: {}]: {}",
                r.name,
                r.status,
                r.furthest_state,
                r.failure_reason.as_deref().unwrap_or("-")
            )
        })
        .collect()
}
