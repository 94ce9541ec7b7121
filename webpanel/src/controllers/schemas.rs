//! Input schemas checked by the controller before touching the database.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOGIN_MIN_LEN: usize = 4;
pub const LOGIN_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 4;

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid input: {}", .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct SchemaError {
    pub errors: Vec<FieldError>,
}

impl SchemaError {
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// Credentials submitted for authentication, plus the client address they came from.
#[derive(Clone, Deserialize)]
pub struct AuthUser {
    pub login: String,
    pub password: String,
    /// Not validated: whatever the proxy or socket reported
    pub ip_addr: String,
}

impl fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthUser")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("ip_addr", &self.ip_addr)
            .finish()
    }
}

impl AuthUser {
    pub fn new(login: impl Into<String>, password: impl Into<String>, ip_addr: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            ip_addr: ip_addr.into(),
        }
    }

    /// Check every field and report all violations at once.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut errors = Vec::new();

        if let Err(reason) = validate_login(&self.login) {
            errors.push(FieldError { field: "login", reason });
        }
        if let Err(reason) = validate_password(&self.password) {
            errors.push(FieldError { field: "password", reason });
        }

        if errors.is_empty() { Ok(()) } else { Err(SchemaError { errors }) }
    }
}

fn validate_login(login: &str) -> Result<(), String> {
    let len = login.chars().count();
    if !(LOGIN_MIN_LEN..=LOGIN_MAX_LEN).contains(&len) {
        return Err(format!(
            "Login must be between {LOGIN_MIN_LEN} and {LOGIN_MAX_LEN} characters."
        ));
    }
    if !login.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err("Login contains invalid characters. Only letters, digits, '.', '-', and '_' are allowed.".to_string());
    }
    if login.starts_with(['.', '-']) {
        return Err("Login cannot start with '.' or '-'.".to_string());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(format!("Password must be at least {PASSWORD_MIN_LEN} characters long."));
    }
    if password.contains(' ') {
        return Err("Password cannot contain spaces.".to_string());
    }
    Ok(())
}
