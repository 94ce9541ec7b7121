//! Handlers for the index, about and login pages.

use axum::{
    Form,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use tracing::{debug, instrument};

use super::{client_ip::ClientIp, forms, forms::LoginForm, path_for, templates};
use crate::controllers::schemas::AuthUser;
use crate::errors::{Error, Result};
use crate::repository::SessionManager;
use crate::session::Session;
use crate::static_assets::Assets;
use crate::types::session_keys;
use crate::AppState;

pub const INVALID_CREDENTIALS: &str = "Invalid login or password.";

fn logged_in(session: &Session) -> bool {
    session.exists(session_keys::USER_ID)
}

fn render_login(state: &AppState, session: &Session, login: &str, errors: &[String]) -> Result<Response> {
    let csrf_token = state.config.csrf_enabled.then(|| forms::csrf_token(session));
    let body = templates::render(
        "login.html",
        context! { csrf_token => csrf_token, login => login, errors => errors, logged_in => logged_in(session) },
    )?;
    Ok(Html(body).into_response())
}

/// `/`: send active sessions to the about page and everyone else to the login page.
#[instrument(skip_all, fields(ip = %ip))]
pub async fn index(State(state): State<AppState>, session: Session, ClientIp(ip): ClientIp) -> Redirect {
    if state.controller.check_activity_session(&session, &ip) {
        Redirect::to(path_for("about"))
    } else {
        Redirect::to(path_for("login"))
    }
}

#[instrument(skip_all)]
pub async fn about(State(state): State<AppState>, session: Session) -> Result<Html<String>> {
    let (role, permissions) = match state.controller.current_permissions(&session).await {
        Some((role, permissions)) => (Some(role), permissions),
        None => (None, Vec::new()),
    };

    let body = templates::render(
        "about.html",
        context! { role => role, permissions => permissions, logged_in => logged_in(&session) },
    )?;
    Ok(Html(body))
}

#[instrument(skip_all)]
pub async fn login_get(State(state): State<AppState>, session: Session) -> Result<Response> {
    render_login(&state, &session, "", &[])
}

#[instrument(skip_all, fields(ip = %ip, login = %form.login))]
pub async fn login_post(
    State(state): State<AppState>,
    session: Session,
    ClientIp(ip): ClientIp,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if state.controller.check_activity_session(&session, &ip) {
        return Ok(Redirect::to(path_for("about")).into_response());
    }

    if state.config.csrf_enabled && !forms::verify_csrf(&session, &form.csrf_token) {
        return Err(Error::Forbidden {
            message: "CSRF token missing or invalid".to_string(),
        });
    }

    let errors = form.validate();
    if !errors.is_empty() {
        debug!(?errors, "Login form rejected");
        return render_login(&state, &session, &form.login, &errors);
    }

    let login = form.login.clone();
    let input = AuthUser::new(form.login, form.password, ip);
    match state.controller.auth_user(&session, input).await {
        Ok(true) => Ok(Redirect::to(path_for("about")).into_response()),
        Ok(false) => render_login(&state, &session, &login, &[INVALID_CREDENTIALS.to_string()]),
        Err(e) => {
            debug!("Credentials failed validation: {}", e);
            render_login(&state, &session, &login, &[INVALID_CREDENTIALS.to_string()])
        }
    }
}

#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, session: Session) -> Redirect {
    state.controller.logout(&session);
    Redirect::to(path_for("login"))
}

/// Any path without a route.
pub async fn not_found(uri: Uri) -> Error {
    Error::NotFound {
        path: uri.path().to_string(),
    }
}

/// Serve files embedded from `static/`.
#[instrument]
pub async fn static_asset(Path(path): Path<String>) -> Response {
    let Some(content) = Assets::get(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        Body::from(content.data.into_owned()),
    )
        .into_response()
}
