use crate::views::templates;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The request was understood but is not allowed (bad CSRF token, etc.)
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// No route matches the requested path
    #[error("No page at {path}")]
    NotFound { path: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Template lookup or rendering failed
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Invalid or inconsistent configuration
    #[error("Config validation: {message}")]
    Config { message: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } | Error::Template(_) | Error::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Title and message shown on the error page, without leaking internal details
    pub fn user_message(&self) -> (&'static str, &'static str) {
        match self.status_code() {
            StatusCode::FORBIDDEN => ("Forbidden Error 403", "Come back later"),
            StatusCode::INTERNAL_SERVER_ERROR => ("Internal Server Error 500", "Come back later"),
            _ => ("Internal Error", "Ops....."),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. } | Error::Template(_) | Error::Config { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Forbidden { .. } => {
                tracing::warn!("Forbidden request: {}", self);
            }
            Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let (title, message) = self.user_message();

        match templates::render_error(title, message) {
            Ok(body) => (status, Html(body)).into_response(),
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                (status, format!("{title}: {message}")).into_response()
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
