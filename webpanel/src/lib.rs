//! # webpanel: session-based authentication panel
//!
//! `webpanel` serves a small HTML panel in front of a relational store of users, roles and
//! permissions. Visitors sign in with a login and password; the panel keeps who they are in a
//! server-side session (Redis in production, an in-process cache in development) referenced by a
//! signed cookie.
//!
//! ## Architecture
//!
//! ```text
//! axum router ─▶ views ─▶ MainController ─▶ UserRepository ─▶ DbHelper ─▶ sqlx (Postgres / SQLite)
//!                  │             │
//!                  └─ Session ◀──┘ (SessionManager) ─▶ SessionStore (Redis / memory)
//! ```
//!
//! Everything is wired by hand in [`Application::new`]: the [`Database`](db::Database) pool, the
//! [`QueryManager`](db::QueryManager) holding the named SQL statements, the
//! [`DbHelper`](db::DbHelper) that executes them, the [`Users`](repository::Users) repository, the
//! [`MainController`](controllers::MainController) and the session store.
//!
//! SQL lives in a YAML file rather than in code:
//!
//! ```yaml
//! users:
//!   get_user_by_login: |
//!     SELECT u.id AS user_id, u.login, u.password_hash, r.role_name
//!     FROM users u JOIN role r ON r.id = u.role_id
//!     WHERE u.login = :login
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use webpanel::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = webpanel::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     webpanel::telemetry::init_telemetry(&config.logging)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! The tables are created and seeded with `webpanel init-db`.

pub mod auth;
pub mod config;
pub mod controllers;
pub mod db;
pub mod errors;
pub mod repository;
pub mod session;
pub mod static_assets;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;
pub mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    middleware::from_fn_with_state,
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span};

pub use config::Config;
use controllers::MainController;
use db::{Database, DbHelper, QueryManager};
use repository::{UserRepository, Users};
use session::{Sessions, session_middleware};

/// Shared state handed to every handler.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(Arc::new(config))
///     .controller(controller)
///     .sessions(sessions)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    pub controller: MainController,
    pub sessions: Sessions,
}

/// Assemble the views with the session middleware, body limit and request tracing.
pub fn build_router(state: AppState) -> Router {
    let service_name = state.config.logging.service_name.clone();

    let mut router = views::router()
        .layer(from_fn_with_state(state.sessions.clone(), session_middleware))
        .with_state(state.clone());

    if let Some(limit) = state.config.max_content_length {
        router = router.layer(DefaultBodyLimit::max(limit));
    }

    router.layer(TraceLayer::new_for_http().make_span_with(move |request: &Request| {
        info_span!(
            "http_request",
            service_name = %service_name,
            method = %request.method(),
            uri = %request.uri(),
        )
    }))
}

/// Owns the router and the database pool for the lifetime of the server.
pub struct Application {
    router: Router,
    config: Arc<Config>,
    db: Database,
}

impl Application {
    /// Connect to the database and session store and build the router.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting panel with configuration: {:#?}", config);

        let db = Database::connect(&config.database).await?;
        let queries = QueryManager::from_yaml(&config.database.queries_path)?;
        info!(count = queries.len(), "Loaded SQL queries");

        let secret = config
            .secret_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("secret_key is not configured"))?;
        let sessions = Sessions::from_config(&config.session, secret.as_bytes()).await?;

        Ok(Self::from_parts(config, db, queries, sessions))
    }

    /// Wire already-constructed resources together.
    pub fn from_parts(config: Config, db: Database, queries: QueryManager, sessions: Sessions) -> Self {
        let helper = DbHelper::new(db.clone(), Arc::new(queries), config.slow_statement_threshold());
        let users: Arc<dyn UserRepository> = Arc::new(Users::new(helper));
        let controller = MainController::new(users);

        let config = Arc::new(config);
        let state = AppState::builder()
            .config(config.clone())
            .controller(controller)
            .sessions(sessions)
            .build();

        views::log_routes();
        let router = build_router(state);

        Self { router, config, db }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Serve until `shutdown` resolves, then close the database pool.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Panel listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.db.close().await;

        Ok(())
    }
}
