//! Test utilities: fast password hashing, a seeded in-memory database and a ready router.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::auth::password::Argon2Params;
use crate::config::{Config, DatabaseConfig, LogFormat, PoolSettings};
use crate::db::{Database, DbHelper, QueryManager, initializer::DatabaseInitializer};
use crate::session::{Sessions, store::MemoryStore};

/// Cheap Argon2 parameters so hashing does not dominate test time.
pub const TEST_ARGON2_PARAMS: Argon2Params = Argon2Params {
    memory_kib: 1024,
    iterations: 1,
    parallelism: 1,
};

pub const TEST_SECRET_KEY: &str = "test-secret-key-for-testing-only";

pub const TEST_SEED: &str = r#"
default_permissions:
  - name: read
    description: Read access
  - name: write
    description: Write access
  - name: delete
    description: Delete access
default_role_name:
  - role_name: admin
    description: Administrator
    permissions: [read, write, delete]
  - role_name: user
    description: Regular user
    permissions: [read]
default_users:
  - login: admin
    password: admin_password
    role_name: admin
  - login: user
    password: user_password
    role_name: user
"#;

/// A single connection that never expires, so an in-memory SQLite database lives as long as
/// the pool.
pub fn test_pool_settings() -> PoolSettings {
    PoolSettings {
        max_connections: 1,
        min_connections: 0,
        acquire_timeout_secs: 5,
        idle_timeout_secs: 0,
        max_lifetime_secs: 0,
    }
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some(TEST_SECRET_KEY.to_string()),
        database: DatabaseConfig {
            url: Some("sqlite::memory:".to_string()),
            pool: test_pool_settings(),
            queries_path: "config/queries.yaml".into(),
            seed_path: "config/seed.yaml".into(),
        },
        ..Config::default()
    }
}

/// In-memory database with the schema created and [`TEST_SEED`] loaded.
pub async fn setup_test_db() -> Database {
    let db = Database::connect_with("sqlite::memory:", &test_pool_settings())
        .await
        .expect("Failed to open in-memory database");
    let initializer = DatabaseInitializer::from_yaml_str(TEST_SEED, Some(TEST_ARGON2_PARAMS)).expect("Invalid test seed");
    db.create_tables(&initializer).await.expect("Failed to create tables");
    db
}

/// Seeded database behind the queries shipped in `config/queries.yaml`.
pub async fn setup_test_helper() -> DbHelper {
    let config = create_test_config();
    let queries = QueryManager::from_yaml(&config.database.queries_path).expect("Failed to load queries");
    DbHelper::new(setup_test_db().await, Arc::new(queries), Duration::from_secs(1))
}

/// The full router over a seeded database and an in-memory session store.
pub async fn create_test_app() -> (Router, Database) {
    let config = create_test_config();
    let db = setup_test_db().await;
    let queries = QueryManager::from_yaml(&config.database.queries_path).expect("Failed to load queries");
    let sessions = Sessions::new(Arc::new(MemoryStore::default()), config.session.clone(), TEST_SECRET_KEY.as_bytes());

    let app = crate::Application::from_parts(config, db.clone(), queries, sessions);
    (app.router(), db)
}

/// URL-encoded body for `POST /login`.
pub fn login_form_body(login: &str, password: &str, csrf_token: &str) -> String {
    serde_urlencoded::to_string([("login", login), ("password", password), ("csrf_token", csrf_token)])
        .expect("Failed to encode login form")
}

/// JSON log lines written by the subscriber from [`capture_logs`].
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn events(&self) -> Vec<serde_json::Value> {
        let buffer = self.0.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Audit events whose `action` field equals `action`.
    pub fn actions(&self, action: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter(|event| event["fields"]["action"] == action)
            .collect()
    }

    pub fn with_target(&self, target: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter(|event| event["target"] == target)
            .collect()
    }
}

pub struct LogCaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter(self.0.clone())
    }
}

/// Record every event emitted on the current thread, as JSON, until the guard is dropped.
pub fn capture_logs() -> (LogCapture, DefaultGuard) {
    let logs = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(crate::telemetry::fmt_layer(&LogFormat::Json, logs.clone()));
    (logs, tracing::subscriber::set_default(subscriber))
}
