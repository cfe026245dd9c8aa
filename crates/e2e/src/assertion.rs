//! Assertion harness: turns an observed outcome into a verdict

use serde::{Deserialize, Serialize};

use crate::driver::ObservedOutcome;
use crate::spec::Scenario;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub scenario_name: String,
    pub passed: bool,
    /// Expected versus actual, one clause per mismatch
    pub failure_reason: Option<String>,
}

/// Compare `outcome` with what `scenario` expects
///
/// Pure: neither argument is modified and the same inputs always give the
/// same verdict.
pub fn evaluate(scenario: &Scenario, outcome: &ObservedOutcome) -> Verdict {
    let mut mismatches = Vec::new();

    if !scenario.expect.matches(&outcome.result_text) {
        mismatches.push(format!(
            "{}: expected {}, got {:?}",
            scenario.result_selector, scenario.expect, outcome.result_text
        ));
    }

    if let Some(check) = &scenario.auxiliary {
        let expected = check.expect_present();
        if outcome.auxiliary_present != Some(expected) {
            mismatches.push(format!(
                "{}: expected {}, got {}",
                check.describe(),
                presence(Some(expected)),
                presence(outcome.auxiliary_present)
            ));
        }
    }

    Verdict {
        scenario_name: scenario.name.clone(),
        passed: mismatches.is_empty(),
        failure_reason: (!mismatches.is_empty()).then(|| mismatches.join("; ")),
    }
}

fn presence(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "present",
        Some(false) => "absent",
        None => "unknown",
    }
}
