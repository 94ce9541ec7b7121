//! HTML views.

pub mod client_ip;
pub mod forms;
pub mod main;
pub mod templates;

use axum::{Router, routing::get};

use crate::AppState;

/// Endpoint name to path, as exposed to templates under `routes`.
pub const ROUTES: &[(&str, &str)] = &[
    ("index", "/"),
    ("about", "/about"),
    ("login", "/login"),
    ("logout", "/logout"),
    ("static", "/static"),
];

pub fn path_for(endpoint: &str) -> &'static str {
    ROUTES
        .iter()
        .find(|(name, _)| *name == endpoint)
        .map(|(_, path)| *path)
        .unwrap_or("/")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(main::index))
        .route("/about", get(main::about))
        .route("/login", get(main::login_get).post(main::login_post))
        .route("/logout", get(main::logout))
        .route("/static/{*path}", get(main::static_asset))
        .fallback(main::not_found)
}

/// Log every route at start-up.
pub fn log_routes() {
    for (endpoint, path) in ROUTES {
        let path = if *endpoint == "static" { "/static/{*path}" } else { path };
        tracing::info!("Route: {}, Endpoint: {}", path, endpoint);
    }
}
