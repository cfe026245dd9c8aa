//! The bundled YAML suite against the built-in one

mod common;

use std::path::Path;
use std::sync::Arc;

use authflow_e2e::{scenarios, ScenarioSuite, SessionIdentity, TestRunner};

use common::{runner_config, FakeAuthApp, FakeSessions};

fn bundled() -> ScenarioSuite {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
    let suites = ScenarioSuite::load_all(&dir).unwrap();
    ScenarioSuite::merge("bundled", suites).unwrap()
}

#[test]
fn test_bundled_suite_mirrors_builtin_flow() {
    let identity = SessionIdentity::from_token("1700000000000");
    let yaml = bundled().bind(&identity);
    let builtin = scenarios::auth_flow(&identity);

    assert_eq!(yaml.scenarios.len(), builtin.scenarios.len());
    for (from_yaml, built) in yaml.scenarios.iter().zip(&builtin.scenarios) {
        assert_eq!(from_yaml.name, built.name);
        assert_eq!(from_yaml.target_path, built.target_path);
        assert_eq!(from_yaml.fields, built.fields, "{}", built.name);
        assert_eq!(from_yaml.submit_selector, built.submit_selector);
        assert_eq!(from_yaml.result_selector, built.result_selector);
        assert_eq!(from_yaml.auxiliary, built.auxiliary);
        assert_eq!(from_yaml.depends_on, built.depends_on);
        assert_eq!(from_yaml.tags, built.tags);
    }
}

#[tokio::test]
async fn test_bundled_suite_passes_against_app() {
    let app = FakeAuthApp::new();
    let identity = SessionIdentity::from_token("59");
    let mut runner = TestRunner::new(runner_config().await, Arc::new(FakeSessions { app }));

    let report = runner.run_suite(&bundled(), &identity).await.unwrap();
    assert!(report.success(), "{:#?}", report.results);
}

#[test]
fn test_tag_filter_keeps_dependencies() {
    let suite = bundled().filter_by_tag("login");
    let names: Vec<_> = suite.scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            scenarios::REGISTER_SUCCESS,
            scenarios::LOGIN_SUCCESS,
            scenarios::LOGIN_WRONG_PASSWORD
        ]
    );
    suite.validate().unwrap();
}
