//! Per-session unique identity
//!
//! Registration scenarios need usernames and emails that never collide with
//! accounts created by earlier runs. One token is minted per session and handed
//! to every scenario that needs it, so the login scenarios see exactly the
//! account the registration scenario created.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the session token in scenario strings
pub const UNIQUE_PLACEHOLDER: &str = "{unique}";

/// Identity shared read-only by all scenarios of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    token: String,
}

impl SessionIdentity {
    /// Mint a fresh identity from the current wall-clock time in milliseconds
    pub fn generate() -> Self {
        Self::from_token(chrono::Utc::now().timestamp_millis().to_string())
    }

    /// Build an identity around a fixed token (tests, reproducing a run)
    pub fn from_token(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `<prefix>_<token>`
    pub fn username(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.token)
    }

    /// `<prefix>_<token>@example.com`
    pub fn email(&self, prefix: &str) -> String {
        format!("{}@example.com", self.username(prefix))
    }

    /// Replace every `{unique}` in `input` with the session token
    pub fn expand(&self, input: &str) -> String {
        input.replace(UNIQUE_PLACEHOLDER, &self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_formats() {
        let id = SessionIdentity::from_token("1700000000000");
        assert_eq!(id.username("user"), "user_1700000000000");
        assert_eq!(id.email("user"), "user_1700000000000@example.com");
        assert_eq!(id.email("nomatch"), "nomatch_1700000000000@example.com");
    }

    #[test]
    fn test_expand_placeholder() {
        let id = SessionIdentity::from_token("42");
        assert_eq!(id.expand("short_{unique}@example.com"), "short_42@example.com");
        assert_eq!(id.expand("no placeholder"), "no placeholder");
        assert_eq!(id.expand("{unique}-{unique}"), "42-42");
    }

    #[test]
    fn test_generated_token_is_numeric() {
        let id = SessionIdentity::generate();
        assert!(!id.token().is_empty());
        assert!(id.token().chars().all(|c| c.is_ascii_digit()));
    }
}
