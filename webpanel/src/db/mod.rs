//! Database layer.
//!
//! - [`core`]: pool ownership, transactions, creating and dropping the schema
//! - [`schema`]: DDL per supported [`Dialect`](schema::Dialect)
//! - [`initializer`]: seeds permissions, roles and users from YAML
//! - [`query_manager`]: named SQL statements loaded from YAML
//! - [`helper`]: executes named statements with bound parameters
//! - [`models`]: row types
//! - [`errors`]: [`DbError`](errors::DbError) and its classification
//!
//! Every statement goes through the `sqlx` `Any` driver, so the same code runs against Postgres
//! in production and in-memory SQLite in tests.

pub mod core;
pub mod errors;
pub mod helper;
pub mod initializer;
pub mod models;
pub mod query_manager;
pub mod schema;

pub use self::core::Database;
pub use helper::{DbHelper, SqlParam};
pub use query_manager::QueryManager;
