//! Built-in registration and login scenarios

use crate::identity::SessionIdentity;
use crate::spec::{AuxiliaryCheck, FieldFill, Scenario, ScenarioSuite, TextPattern};

pub const REGISTER_PAGE: &str = "/static/register.html";
pub const LOGIN_PAGE: &str = "/static/login.html";
pub const REGISTER_MESSAGE: &str = "#register-message";
pub const LOGIN_MESSAGE: &str = "#login-message";
pub const TOKEN_KEY: &str = "access_token";

pub const STRONG_PASSWORD: &str = "StrongPass123!";

pub const REGISTER_SUCCESS: &str = "register-success";
pub const LOGIN_SUCCESS: &str = "login-success";
pub const REGISTER_SHORT_PASSWORD: &str = "register-short-password";
pub const REGISTER_PASSWORD_MISMATCH: &str = "register-password-mismatch";
pub const LOGIN_WRONG_PASSWORD: &str = "login-wrong-password";

fn register_fields(username: String, email: String, password: &str, confirm: &str) -> Vec<FieldFill> {
    vec![
        FieldFill::new("#first_name", "Test"),
        FieldFill::new("#last_name", "User"),
        FieldFill::new("#username", username),
        FieldFill::new("#email", email),
        FieldFill::new("#password", password),
        FieldFill::new("#confirm_password", confirm),
    ]
}

fn login_fields(identifier: String, password: &str) -> Vec<FieldFill> {
    vec![
        FieldFill::new("#username_or_email", identifier),
        FieldFill::new("#password", password),
    ]
}

fn scenario(
    name: &str,
    description: &str,
    tags: &[&str],
    target_path: &str,
    fields: Vec<FieldFill>,
    result_selector: &str,
    expect: &str,
) -> Scenario {
    Scenario {
        name: name.to_string(),
        description: description.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        target_path: target_path.to_string(),
        fields,
        submit_selector: crate::spec::DEFAULT_SUBMIT_SELECTOR.to_string(),
        result_selector: result_selector.to_string(),
        expect: TextPattern::contains(expect),
        auxiliary: None,
        depends_on: None,
    }
}

/// The authentication flow: two successful paths and three rejections
///
/// Login scenarios depend on the registration scenario, which creates the
/// `user_<token>` account they sign in with.
pub fn auth_flow(identity: &SessionIdentity) -> ScenarioSuite {
    let token_set = AuxiliaryCheck::local_storage(TOKEN_KEY, true);
    let token_unset = AuxiliaryCheck::local_storage(TOKEN_KEY, false);

    let register_success = Scenario {
        auxiliary: Some(token_set.clone()),
        ..scenario(
            REGISTER_SUCCESS,
            "Register successfully with valid inputs",
            &["auth", "register", "smoke"],
            REGISTER_PAGE,
            register_fields(
                identity.username("user"),
                identity.email("user"),
                STRONG_PASSWORD,
                STRONG_PASSWORD,
            ),
            REGISTER_MESSAGE,
            "successful",
        )
    };

    let login_success = Scenario {
        auxiliary: Some(token_set),
        depends_on: Some(REGISTER_SUCCESS.to_string()),
        ..scenario(
            LOGIN_SUCCESS,
            "Login successfully with valid credentials",
            &["auth", "login", "smoke"],
            LOGIN_PAGE,
            login_fields(identity.username("user"), STRONG_PASSWORD),
            LOGIN_MESSAGE,
            "successful",
        )
    };

    let short_password = Scenario {
        auxiliary: Some(token_unset.clone()),
        ..scenario(
            REGISTER_SHORT_PASSWORD,
            "Registration fails for short password",
            &["auth", "register", "negative"],
            REGISTER_PAGE,
            register_fields(
                identity.username("short"),
                identity.email("short"),
                "short",
                "short",
            ),
            REGISTER_MESSAGE,
            "password",
        )
    };

    let mismatch = Scenario {
        auxiliary: Some(token_unset.clone()),
        ..scenario(
            REGISTER_PASSWORD_MISMATCH,
            "Registration fails if passwords do not match",
            &["auth", "register", "negative"],
            REGISTER_PAGE,
            register_fields(
                identity.username("nomatch"),
                identity.email("nomatch"),
                STRONG_PASSWORD,
                "WrongPassword",
            ),
            REGISTER_MESSAGE,
            "match",
        )
    };

    let wrong_password = Scenario {
        auxiliary: Some(token_unset),
        depends_on: Some(REGISTER_SUCCESS.to_string()),
        ..scenario(
            LOGIN_WRONG_PASSWORD,
            "Login fails with wrong password",
            &["auth", "login", "negative"],
            LOGIN_PAGE,
            login_fields(identity.username("user"), "WrongPass!"),
            LOGIN_MESSAGE,
            "invalid",
        )
    };

    ScenarioSuite {
        name: "auth-flow".to_string(),
        description: "Registration and login forms".to_string(),
        scenarios: vec![
            register_success,
            login_success,
            short_password,
            mismatch,
            wrong_password,
        ],
    }
}
