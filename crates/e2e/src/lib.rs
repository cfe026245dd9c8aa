//! Authflow E2E Test Framework
//!
//! Drives a web application's registration and login forms through a real
//! browser and checks what the page shows afterwards:
//! - Starts the application server, or attaches to one already running
//! - Opens an isolated Chromium session per scenario
//! - Fills the form, submits it and waits for the result message to settle
//! - Asserts on the message text and on `localStorage`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start_server() -> ServerHandle                       │
//! │    ├── SessionFactory::open() -> PageDriver                 │
//! │    ├── ScenarioDriver::run(scenario) -> ObservedOutcome     │
//! │    └── evaluate(scenario, outcome) -> Verdict               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML or built-in)                                │
//! │    ├── target_path                                          │
//! │    ├── fields: [{ selector, value }]                        │
//! │    ├── submit_selector, result_selector                     │
//! │    ├── expect: "successful" | /successful/i                 │
//! │    ├── auxiliary: { local_storage key, expect_present }     │
//! │    └── depends_on                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertion;
pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod identity;
pub mod runner;
pub mod scenarios;
pub mod server;
pub mod spec;

pub use assertion::{evaluate, Verdict};
pub use browser::{Locator, PageDriver, SessionFactory};
pub use config::HarnessConfig;
pub use driver::{run_scenario, ObservedOutcome, RunState, ScenarioFailure};
pub use error::{E2eError, E2eResult};
pub use identity::SessionIdentity;
pub use runner::{ScenarioReport, ScenarioStatus, SuiteReport, TestRunner};
pub use spec::{AuxiliaryCheck, FieldFill, Scenario, ScenarioSuite, TextPattern};
