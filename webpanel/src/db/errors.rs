use super::query_manager::QueryError;
use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// The database could not be reached, or the pool gave up waiting for a connection
    #[error("Database connection error: {message}")]
    Connection { message: String },

    /// The statement was rejected by the database before execution
    #[error("SQL syntax error: {message}")]
    Syntax { message: String },

    /// A value could not be encoded for, or decoded from, the database
    #[error("Data error: {message}")]
    Data { message: String },

    /// The pool was closed (or never opened) when the operation ran
    #[error("Database is not initialized")]
    NotInitialized,

    /// Named statement lookup failed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A `:name` placeholder had no matching value
    #[error("Query '{query}' expects parameter '{param}'")]
    MissingParameter { query: String, param: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Broad classes used to pick the log severity for a failed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connection,
    Integrity,
    Syntax,
    Data,
    Other,
}

impl DbError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DbError::Connection { .. } | DbError::NotInitialized => ErrorCategory::Connection,
            DbError::UniqueViolation { .. } | DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => {
                ErrorCategory::Integrity
            }
            DbError::Syntax { .. } => ErrorCategory::Syntax,
            DbError::Data { .. } | DbError::NotFound | DbError::MissingParameter { .. } => ErrorCategory::Data,
            DbError::Query(_) | DbError::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if is_syntax_error(db_err.code().as_deref(), db_err.message()) {
                    DbError::Syntax {
                        message: db_err.message().to_string(),
                    }
                } else {
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                DbError::Connection { message: err.to_string() }
            }
            sqlx::Error::Configuration(_) => DbError::Connection { message: err.to_string() },
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::Encode(_) => DbError::Data { message: err.to_string() },
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Postgres reports syntax errors with SQLSTATE class 42; SQLite only gives a message.
fn is_syntax_error(code: Option<&str>, message: &str) -> bool {
    match code {
        Some(code) if code.starts_with("42") => true,
        _ => message.contains("syntax error") || message.starts_with("no such table") || message.starts_with("no such column"),
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
