//! Authflow E2E runner entry point
//!
//! Runs the built-in registration/login scenarios, or YAML suites from a
//! directory, against the application at the configured base URL.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use authflow_e2e::browser::ChromiumFactory;
use authflow_e2e::config::{HarnessConfig, Isolation};
use authflow_e2e::runner::failure_summary;
use authflow_e2e::{scenarios, E2eResult, ScenarioSuite, SessionIdentity, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "authflow-e2e")]
#[command(about = "Browser-driven E2E runner for registration and login flows")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "e2e.toml")]
    config: PathBuf,

    /// Directory of YAML suites to run instead of the built-in flow
    #[arg(short, long)]
    specs: Option<PathBuf>,

    /// Run only scenarios with this tag (plus their dependencies)
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only the named scenario (plus its dependencies)
    #[arg(short, long)]
    name: Option<String>,

    /// Origin the page paths are resolved against
    #[arg(long, env = "AUTHFLOW_BASE_URL")]
    base_url: Option<String>,

    /// Shell command that starts the application
    #[arg(long)]
    server_command: Option<String>,

    /// Port the application listens on; also applied to the base URL and
    /// to `{port}` in the server command
    #[arg(long)]
    port: Option<u16>,

    /// Attach to a server already listening on the port
    #[arg(long, conflicts_with = "fresh_server")]
    reuse_existing_server: bool,

    /// Always launch a new server; fail if the port is taken
    #[arg(long)]
    fresh_server: bool,

    /// Do not launch a server; only wait for one at the base URL
    #[arg(long)]
    no_server: bool,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Launch Chromium with --no-sandbox
    #[arg(long)]
    no_sandbox: bool,

    /// Concurrent isolated scenarios
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run every scenario in one browser session
    #[arg(long)]
    shared_session: bool,

    /// Reuse a session token instead of minting a new one
    #[arg(long)]
    identity: Option<String>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

fn apply_overrides(mut config: HarnessConfig, args: &Args) -> E2eResult<HarnessConfig> {
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(command) = &args.server_command {
        config.server.command = command.clone();
    }
    if let Some(port) = args.port {
        config.set_port(port)?;
    }
    if args.reuse_existing_server {
        config.server.reuse_existing_server = true;
    }
    if args.fresh_server {
        config.server.reuse_existing_server = false;
    }
    if args.no_server {
        config.server.enabled = false;
    }
    if args.headed {
        config.browser.headless = false;
    }
    if args.no_sandbox {
        config.browser.no_sandbox = true;
    }
    if let Some(workers) = args.workers {
        config.run.workers = workers;
    }
    if args.shared_session {
        config.run.isolation = Isolation::Shared;
    }
    if let Some(specs) = &args.specs {
        config.run.specs_dir = Some(specs.clone());
    }
    if let Some(output) = &args.output {
        config.run.output_dir = output.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let config = apply_overrides(HarnessConfig::load(&args.config)?, &args)?;

    let identity = match &args.identity {
        Some(token) => SessionIdentity::from_token(token.clone()),
        None => SessionIdentity::generate(),
    };

    let mut suite = match &config.run.specs_dir {
        Some(dir) => {
            let suites = ScenarioSuite::load_all(dir)?;
            info!("Loaded {} suite(s) from {}", suites.len(), dir.display());
            ScenarioSuite::merge(dir.display().to_string(), suites)?
        }
        None => scenarios::auth_flow(&identity),
    };
    if let Some(name) = &args.name {
        suite = suite.retain_with_dependencies(|s| &s.name == name);
    }
    if let Some(tag) = &args.tag {
        suite = suite.filter_by_tag(tag);
    }
    if suite.scenarios.is_empty() {
        return Err(authflow_e2e::E2eError::SpecParse(
            "no scenarios match the given filters".to_string(),
        ));
    }

    let sessions = Arc::new(ChromiumFactory::new(config.browser.clone()));
    let mut runner = TestRunner::new(config, sessions);

    let report = runner.run_suite(&suite, &identity).await;
    runner.stop_server().await?;
    let report = report?;

    runner.write_results(&report)?;

    for line in failure_summary(&report) {
        error!("{}", line);
    }

    Ok(report.success())
}
