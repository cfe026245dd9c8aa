//! Server management - launching or attaching to the application under test

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to the application server
///
/// Either owns a process it launched, or merely points at one that was
/// already listening. Owned processes are terminated on [`stop`] or drop.
///
/// [`stop`]: ServerHandle::stop
pub struct ServerHandle {
    child: Option<Child>,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Launch the configured command, or reuse a server already on the port
    pub async fn start(config: &ServerConfig, base_url: &str) -> E2eResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if port_in_use(config.port).await {
            if !config.reuse_existing_server {
                return Err(E2eError::PortInUse(config.port));
            }
            info!("Reusing server already listening on port {}", config.port);
            let mut handle = ServerHandle {
                child: None,
                base_url,
                port: config.port,
            };
            handle.wait_for_healthy(config).await?;
            return Ok(handle);
        }

        let command = config.command_line();
        info!("Starting server: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("exec {}", command))
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn '{}': {}", command, e))
        })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr");
        }

        let mut handle = ServerHandle {
            child: Some(child),
            base_url,
            port: config.port,
        };

        // Wait for server to be healthy
        handle.wait_for_healthy(config).await?;

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for a server someone else manages to become ready at `base_url`
    pub async fn attach(config: &ServerConfig, base_url: &str) -> E2eResult<Self> {
        let mut handle = ServerHandle {
            child: None,
            base_url: base_url.trim_end_matches('/').to_string(),
            port: config.port,
        };
        handle.wait_for_healthy(config).await?;
        info!("Attached to server at {}", handle.base_url);
        Ok(handle)
    }

    /// Whether this handle launched the process it points at
    pub fn is_owned(&self) -> bool {
        self.child.is_some()
    }

    /// Poll the readiness URL until it answers with a success status
    async fn wait_for_healthy(&mut self, config: &ServerConfig) -> E2eResult<()> {
        let health_url = config.health_url(&self.base_url);
        let timeout_duration = config.startup_timeout();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    self.child = None;
                    return Err(E2eError::ServerStartup(format!(
                        "server exited before becoming healthy ({})",
                        status
                    )));
                }
            }

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server at {} ...", health_url);
                    }
                    // Connection refused is expected while server is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server if this handle launched it
    pub async fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping server (pid: {:?})", child.id());

        // Try graceful shutdown first
        terminate(&child);
        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(status) => {
                debug!("Server exited: {:?}", status?);
            }
            Err(_) => {
                warn!("Server ignored SIGTERM, killing");
                child.kill().await?;
            }
        }

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            terminate(child);
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

fn forward_output<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "authflow_e2e::server::output", stream = name, "{}", line);
        }
    });
}

async fn port_in_use(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

/// Configuration for the application server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Launch or reuse the server on `port`; when false the runner only
    /// waits for readiness at the base URL
    pub enabled: bool,

    /// Shell command that starts the server in the foreground; `{port}` is
    /// replaced by `port`
    pub command: String,

    /// Port the command listens on
    pub port: u16,

    /// Path polled for readiness
    pub health_path: String,

    /// Timeout for server startup
    pub startup_timeout_ms: u64,

    /// Attach to a server already listening on `port` instead of failing
    pub reuse_existing_server: bool,

    /// Directory to run the command in
    pub working_dir: Option<PathBuf>,

    /// Extra environment for the command
    pub env: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: format!("uvicorn app.main:app --host 0.0.0.0 --port {}", PORT_PLACEHOLDER),
            port: 8000,
            health_path: "/health".to_string(),
            startup_timeout_ms: 20_000,
            reuse_existing_server: default_reuse_existing_server(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }
}

/// Placeholder in [`ServerConfig::command`] for the configured port
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Fast local iteration reuses a running server; CI always starts fresh
pub fn default_reuse_existing_server() -> bool {
    std::env::var_os("CI").is_none()
}

impl ServerConfig {
    /// The command with the port substituted
    pub fn command_line(&self) -> String {
        self.command.replace(PORT_PLACEHOLDER, &self.port.to_string())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn health_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.health_path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_matches_port() {
        let config = ServerConfig::default();
        assert!(config.command_line().ends_with("--port 8000"));

        let config = ServerConfig {
            port: 9100,
            ..Default::default()
        };
        assert!(config.command_line().ends_with("--port 9100"));
        assert!(config.enabled);
    }

    #[test]
    fn test_health_url() {
        let config = ServerConfig::default();
        assert_eq!(
            config.health_url("http://127.0.0.1:8000/"),
            "http://127.0.0.1:8000/health"
        );
    }

    #[tokio::test]
    async fn test_exited_command_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ServerConfig {
            command: "exit 3".to_string(),
            port,
            startup_timeout_ms: 5_000,
            reuse_existing_server: false,
            ..Default::default()
        };
        let err = ServerHandle::start(&config, &format!("http://127.0.0.1:{}", port))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, E2eError::ServerStartup(_)), "{err}");
    }
}
