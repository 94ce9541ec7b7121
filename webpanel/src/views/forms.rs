//! The login form and its CSRF token.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::prelude::RngExt;
use rand::rng;
use serde::Deserialize;

use crate::controllers::schemas::{LOGIN_MAX_LEN, LOGIN_MIN_LEN, PASSWORD_MIN_LEN};
use crate::repository::SessionManager;
use crate::types::session_keys;

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub login: String,
    pub password: String,
    pub csrf_token: String,
}

impl LoginForm {
    /// Field-level checks done before the controller sees the credentials.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let login_len = self.login.trim().chars().count();
        if login_len == 0 {
            errors.push("The login field is required".to_string());
        } else if !(LOGIN_MIN_LEN..=LOGIN_MAX_LEN).contains(&login_len) {
            errors.push(format!("Login must be between {LOGIN_MIN_LEN} and {LOGIN_MAX_LEN} characters"));
        }

        let password_len = self.password.chars().count();
        if password_len == 0 {
            errors.push("The password field is required".to_string());
        } else if password_len < PASSWORD_MIN_LEN {
            errors.push(format!("Password must be at least {PASSWORD_MIN_LEN} characters"));
        }

        errors
    }
}

/// Return the session's CSRF token, creating one if needed.
pub fn csrf_token(session: &dyn SessionManager) -> String {
    if let Some(token) = session.get(session_keys::CSRF_TOKEN) {
        return token;
    }

    let mut bytes = [0u8; 32];
    rng().fill(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    session.set(session_keys::CSRF_TOKEN, &token);
    token
}

/// Whether `submitted` matches the token stored in the session.
pub fn verify_csrf(session: &dyn SessionManager, submitted: &str) -> bool {
    let Some(expected) = session.get(session_keys::CSRF_TOKEN) else {
        return false;
    };
    !submitted.is_empty() && constant_time_eq(expected.as_bytes(), submitted.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn form(login: &str, password: &str) -> LoginForm {
        LoginForm {
            login: login.to_string(),
            password: password.to_string(),
            csrf_token: String::new(),
        }
    }

    #[test]
    fn test_valid_form() {
        assert!(form("admin", "admin_password").validate().is_empty());
    }

    #[test]
    fn test_required_fields() {
        let errors = form("", "").validate();
        assert_eq!(
            errors,
            vec!["The login field is required", "The password field is required"]
        );
    }

    #[test]
    fn test_length_rules() {
        assert_eq!(
            form("abc", "abc").validate(),
            vec![
                "Login must be between 4 and 50 characters",
                "Password must be at least 4 characters"
            ]
        );
        assert_eq!(form(&"x".repeat(51), "password").validate().len(), 1);
    }

    #[test]
    fn test_csrf_token_is_stable_per_session() {
        let session = Session::new();
        let token = csrf_token(&session);
        assert_eq!(csrf_token(&session), token);
        assert_ne!(csrf_token(&Session::new()), token);
    }

    #[test]
    fn test_verify_csrf() {
        let session = Session::new();
        assert!(!verify_csrf(&session, "anything"));

        let token = csrf_token(&session);
        assert!(verify_csrf(&session, &token));
        assert!(!verify_csrf(&session, ""));
        assert!(!verify_csrf(&session, "forged"));
        assert!(!verify_csrf(&session, &token[..token.len() - 1]));
    }
}
