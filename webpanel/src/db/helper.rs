//! Executes named statements from the [`QueryManager`].
//!
//! Callers that only care about data use [`DbHelper::execute_query`] and
//! [`DbHelper::execute_update`]: failures are logged and come back as an empty result or `false`.
//! The `try_` variants return the classified [`DbError`] instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::{
    Any,
    any::{AnyArguments, AnyRow},
    query::{Query, QueryAs},
};
use tracing::{error, info, instrument, warn};

use super::core::Database;
use super::errors::{DbError, ErrorCategory, Result};
use super::query_manager::{CompiledQuery, QueryManager};

pub const PROFILER_TARGET: &str = "webpanel::db::profiler";

/// A value bound to a `:name` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(v.into())
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

pub type Params<'a> = &'a [(&'a str, SqlParam)];

#[derive(Clone, Debug)]
pub struct DbHelper {
    db: Database,
    queries: Arc<QueryManager>,
    slow_threshold: Duration,
}

impl DbHelper {
    pub fn new(db: Database, queries: Arc<QueryManager>, slow_threshold: Duration) -> Self {
        Self {
            db,
            queries,
            slow_threshold,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn queries(&self) -> &QueryManager {
        &self.queries
    }

    /// Run a SELECT and map every row to `T`. Errors are logged and yield an empty vec.
    pub async fn execute_query<T>(&self, name: &str, params: Params<'_>) -> Vec<T>
    where
        T: for<'r> sqlx::FromRow<'r, AnyRow> + Send + Unpin,
    {
        match self.try_execute_query(name, params).await {
            Ok(rows) => rows,
            Err(e) => {
                log_db_error(name, params, &e);
                Vec::new()
            }
        }
    }

    /// Run an INSERT/UPDATE/DELETE. Errors are logged and yield `false`.
    pub async fn execute_update(&self, name: &str, params: Params<'_>) -> bool {
        match self.try_execute_update(name, params).await {
            Ok(_) => true,
            Err(e) => {
                log_db_error(name, params, &e);
                false
            }
        }
    }

    #[instrument(skip(self, params), err)]
    pub async fn try_execute_query<T>(&self, name: &str, params: Params<'_>) -> Result<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, AnyRow> + Send + Unpin,
    {
        let compiled = self.queries.get_compiled(name)?;
        let values = ordered_values(name, compiled, params)?;

        let mut query: QueryAs<'_, Any, T, AnyArguments<'_>> = sqlx::query_as(&compiled.sql);
        for value in values {
            query = bind_value(query, value);
        }

        let started = Instant::now();
        let result = query.fetch_all(self.db.pool()?).await;
        self.profile(name, started.elapsed());

        Ok(result?)
    }

    /// Returns the number of affected rows.
    #[instrument(skip(self, params), err)]
    pub async fn try_execute_update(&self, name: &str, params: Params<'_>) -> Result<u64> {
        let compiled = self.queries.get_compiled(name)?;
        let values = ordered_values(name, compiled, params)?;

        let mut query: Query<'_, Any, AnyArguments<'_>> = sqlx::query(&compiled.sql);
        for value in values {
            query = bind_plain(query, value);
        }

        let started = Instant::now();
        let result = query.execute(self.db.pool()?).await;
        self.profile(name, started.elapsed());

        Ok(result?.rows_affected())
    }

    fn profile(&self, name: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed > self.slow_threshold {
            warn!(target: PROFILER_TARGET, query = name, elapsed_ms, "Slow SQL statement");
        } else {
            info!(target: PROFILER_TARGET, query = name, elapsed_ms, "SQL statement executed");
        }
    }
}

/// Match caller-supplied values to the statement's placeholders, in `$n` order.
fn ordered_values<'p>(name: &str, compiled: &CompiledQuery, params: Params<'p>) -> Result<Vec<&'p SqlParam>> {
    compiled
        .params
        .iter()
        .map(|wanted| {
            params
                .iter()
                .find(|(key, _)| key == wanted)
                .map(|(_, value)| value)
                .ok_or_else(|| DbError::MissingParameter {
                    query: name.to_string(),
                    param: wanted.clone(),
                })
        })
        .collect()
}

fn bind_value<'q, T>(query: QueryAs<'q, Any, T, AnyArguments<'q>>, value: &SqlParam) -> QueryAs<'q, Any, T, AnyArguments<'q>> {
    match value {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Null => query.bind(None::<String>),
    }
}

fn bind_plain<'q>(query: Query<'q, Any, AnyArguments<'q>>, value: &SqlParam) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Null => query.bind(None::<String>),
    }
}

/// Log a failed statement at a severity matching its category.
///
/// Only parameter names are logged; values may be credentials.
fn log_db_error(name: &str, params: Params<'_>, err: &DbError) {
    let param_names: Vec<&str> = params.iter().map(|(key, _)| *key).collect();
    match err.category() {
        ErrorCategory::Connection => {
            error!(critical = true, query = name, params = ?param_names, "Database connection error: {}", err);
        }
        ErrorCategory::Integrity => {
            warn!(query = name, params = ?param_names, "Integrity constraint violated: {}", err);
        }
        ErrorCategory::Syntax => {
            error!(query = name, params = ?param_names, "SQL syntax error: {}", err);
        }
        ErrorCategory::Data => {
            warn!(query = name, params = ?param_names, "Data error: {}", err);
        }
        ErrorCategory::Other => {
            error!(query = name, params = ?param_names, "Unexpected database error: {}", err);
        }
    }
}
