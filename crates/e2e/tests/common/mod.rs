//! In-memory stand-in for the application under test
//!
//! `FakeAuthApp` keeps the account table shared by every page; `FakePage`
//! renders the register and login forms, answers a submission after a few
//! polls of the message element and writes `access_token` to its own
//! storage on success, like the real frontend does.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use authflow_e2e::config::HarnessConfig;
use authflow_e2e::{E2eError, E2eResult, PageDriver, SessionFactory};

pub const BASE_URL: &str = "http://app.test";

const REGISTER_ELEMENTS: &[&str] = &[
    "#first_name",
    "#last_name",
    "#username",
    "#email",
    "#password",
    "#confirm_password",
    "button.primary-btn",
    "#register-message",
];

const LOGIN_ELEMENTS: &[&str] = &[
    "#username_or_email",
    "#password",
    "button.primary-btn",
    "#login-message",
];

/// Ways the fake page can misbehave
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Message polls before the response is rendered
    pub response_polls: usize,
    /// Show changing progress text while the response is pending
    pub flicker: bool,
    /// Submission is accepted but no response ever arrives
    pub never_respond: bool,
    /// Every navigation fails
    pub unreachable: bool,
    /// Render the submit button twice
    pub duplicate_submit: bool,
    /// Leave this element out of every page
    pub missing: Option<&'static str>,
    /// Operation that never completes
    pub hang: Option<Hang>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hang {
    Goto,
    Count,
    Fill,
    Click,
}

/// Longer than any bound the tests configure
const HANG: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Account {
    username: String,
    email: String,
    password: String,
}

pub struct FakeAuthApp {
    accounts: Mutex<Vec<Account>>,
    behavior: Behavior,
    sessions: AtomicUsize,
}

impl FakeAuthApp {
    pub fn new() -> Arc<Self> {
        Self::with_behavior(Behavior {
            response_polls: 2,
            ..Default::default()
        })
    }

    pub fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(Vec::new()),
            behavior,
            sessions: AtomicUsize::new(0),
        })
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().unwrap().len()
    }

    pub fn preregister(&self, username: &str, email: &str, password: &str) {
        self.accounts.lock().unwrap().push(Account {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });
    }

    pub fn page(self: &Arc<Self>) -> FakePage {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        FakePage {
            app: Arc::clone(self),
            state: Mutex::new(PageState::default()),
        }
    }

    fn register(&self, form: &HashMap<String, String>) -> Response {
        let field = |name: &str| form.get(name).cloned().unwrap_or_default();
        let (username, email) = (field("#username"), field("#email"));
        let (password, confirm) = (field("#password"), field("#confirm_password"));

        if password.len() < 8 || confirm.len() < 8 {
            return Response::rejected("Password must be at least 8 characters");
        }
        if password != confirm {
            return Response::rejected("Passwords do not match");
        }

        let mut accounts = self.accounts.lock().unwrap();
        if accounts
            .iter()
            .any(|a| a.username == username || a.email == email)
        {
            return Response::rejected("Username or email already registered");
        }
        accounts.push(Account {
            username: username.clone(),
            email,
            password,
        });
        Response::accepted("User registered successfully!", &username)
    }

    fn login(&self, form: &HashMap<String, String>) -> Response {
        let identifier = form.get("#username_or_email").cloned().unwrap_or_default();
        let password = form.get("#password").cloned().unwrap_or_default();

        let accounts = self.accounts.lock().unwrap();
        let found = accounts.iter().find(|a| {
            (a.username == identifier || a.email == identifier) && a.password == password
        });
        match found {
            Some(account) => Response::accepted("Login successful!", &account.username),
            None => Response::rejected("Invalid username or password"),
        }
    }
}

#[derive(Debug, Clone)]
struct Response {
    message: String,
    token: Option<String>,
}

impl Response {
    fn accepted(message: &str, username: &str) -> Self {
        Self {
            message: message.to_string(),
            token: Some(format!("token-{}", username)),
        }
    }

    fn rejected(message: &str) -> Self {
        Self {
            message: message.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Register,
    Login,
}

impl Form {
    fn elements(&self) -> &'static [&'static str] {
        match self {
            Form::Register => REGISTER_ELEMENTS,
            Form::Login => LOGIN_ELEMENTS,
        }
    }

    fn message_selector(&self) -> &'static str {
        match self {
            Form::Register => "#register-message",
            Form::Login => "#login-message",
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    form: Option<Form>,
    values: HashMap<String, String>,
    message: String,
    pending: Option<(Response, usize)>,
    polls: usize,
    storage: HashMap<String, String>,
}

pub struct FakePage {
    app: Arc<FakeAuthApp>,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn set_storage(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .storage
            .insert(key.to_string(), value.to_string());
    }

    fn behavior(&self) -> &Behavior {
        &self.app.behavior
    }

    async fn maybe_hang(&self, op: Hang) {
        if self.behavior().hang == Some(op) {
            tokio::time::sleep(HANG).await;
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.maybe_hang(Hang::Goto).await;
        if self.behavior().unreachable {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }

        // Any origin serves the app; only the path selects the form
        let path = url.splitn(4, '/').nth(3).unwrap_or_default();
        let form = match path {
            "static/register.html" => Form::Register,
            "static/login.html" => Form::Login,
            other => {
                return Err(E2eError::Navigation {
                    url: url.to_string(),
                    reason: format!("404 for {}", other),
                })
            }
        };

        let mut state = self.state.lock().unwrap();
        state.form = Some(form);
        state.values.clear();
        state.message.clear();
        state.pending = None;
        Ok(())
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        self.maybe_hang(Hang::Count).await;
        let state = self.state.lock().unwrap();
        let Some(form) = state.form else {
            return Ok(0);
        };
        let behavior = self.behavior();
        if behavior.missing == Some(selector) {
            return Ok(0);
        }
        if behavior.duplicate_submit && selector == "button.primary-btn" {
            return Ok(2);
        }
        Ok(form.elements().iter().filter(|e| **e == selector).count())
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.maybe_hang(Hang::Fill).await;
        self.state
            .lock()
            .unwrap()
            .values
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.maybe_hang(Hang::Click).await;
        let mut state = self.state.lock().unwrap();
        if selector != "button.primary-btn" {
            return Ok(());
        }
        if self.behavior().never_respond {
            return Ok(());
        }
        let response = match state.form {
            Some(Form::Register) => self.app.register(&state.values),
            Some(Form::Login) => self.app.login(&state.values),
            None => return Ok(()),
        };
        state.pending = Some((response, self.behavior().response_polls));
        Ok(())
    }

    async fn text(&self, selector: &str) -> E2eResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let Some(form) = state.form else {
            return Ok(None);
        };
        if selector != form.message_selector() {
            return Ok(state.values.get(selector).cloned());
        }

        state.polls += 1;
        if let Some((response, remaining)) = state.pending.take() {
            if remaining == 0 {
                if let Some(token) = &response.token {
                    state.storage.insert("access_token".to_string(), token.clone());
                }
                state.message = response.message;
            } else {
                if self.behavior().flicker {
                    state.message = if remaining % 2 == 0 {
                        "Working.".to_string()
                    } else {
                        "Working..".to_string()
                    };
                }
                state.pending = Some((response, remaining - 1));
            }
        }
        Ok(Some(state.message.clone()))
    }

    async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>> {
        Ok(self.state.lock().unwrap().storage.get(key).cloned())
    }
}

/// Hands out a fresh page per session, all backed by the same app
pub struct FakeSessions {
    pub app: Arc<FakeAuthApp>,
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self) -> E2eResult<Box<dyn PageDriver>> {
        Ok(Box::new(self.app.page()))
    }
}

/// Serve `/health` on an ephemeral port, returning the port
pub async fn spawn_health_server() -> u16 {
    let app = Router::new().route("/health", get(|| async { r#"{"status":"ok"}"# }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// [`test_config`] attached to a live readiness endpoint
pub async fn runner_config() -> HarnessConfig {
    let port = spawn_health_server().await;
    let mut config = test_config();
    config.base_url = format!("http://127.0.0.1:{}", port);
    config.server.port = port;
    config
}

/// Fast timeouts, no server management
pub fn test_config() -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.base_url = BASE_URL.to_string();
    config.server.enabled = false;
    config.timeouts.navigation_ms = 1_000;
    config.timeouts.action_ms = 200;
    config.timeouts.result_ms = 300;
    config.timeouts.poll_interval_ms = 5;
    config.timeouts.scenario_ms = 5_000;
    config
}
