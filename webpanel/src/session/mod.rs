//! Server-side sessions keyed by a (signed) cookie.
//!
//! [`session_middleware`] loads the [`Session`] for each request before the handler runs and
//! persists it afterwards. Handlers take the [`Session`] extractor and read or write it through
//! [`SessionManager`].

pub mod cookie;
pub mod store;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::{debug, error, instrument, warn};

use crate::config::{SessionConfig, SessionStoreKind};
use crate::errors::Error;
use crate::repository::SessionManager;
use store::{MemoryStore, RedisStore, SessionData, SessionStore};

#[derive(Debug)]
struct SessionInner {
    id: String,
    /// Loaded from the store, as opposed to started by this request
    existing: bool,
    data: DashMap<String, String>,
    modified: AtomicBool,
    cleared: AtomicBool,
}

/// The current request's session. Clones share state.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// A fresh, empty session with a new id.
    pub fn new() -> Self {
        Self::build(cookie::generate_session_id(), SessionData::new(), false)
    }

    pub fn from_store(id: String, data: SessionData) -> Self {
        Self::build(id, data, true)
    }

    fn build(id: String, data: SessionData, existing: bool) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                existing,
                data: data.into_iter().collect(),
                modified: AtomicBool::new(false),
                cleared: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_existing(&self) -> bool {
        self.inner.existing
    }

    pub fn is_modified(&self) -> bool {
        self.inner.modified.load(Ordering::Acquire)
    }

    pub fn is_cleared(&self) -> bool {
        self.inner.cleared.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    pub fn snapshot(&self) -> SessionData {
        self.inner
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager for Session {
    fn set(&self, key: &str, value: &str) {
        self.inner.data.insert(key.to_string(), value.to_string());
        self.inner.modified.store(true, Ordering::Release);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner.data.get(key).map(|value| value.clone())
    }

    fn exists(&self, key: &str) -> bool {
        self.inner.data.contains_key(key)
    }

    fn remove(&self, key: &str) -> Option<String> {
        let removed = self.inner.data.remove(key).map(|(_, value)| value);
        if removed.is_some() {
            self.inner.modified.store(true, Ordering::Release);
        }
        removed
    }

    fn clear(&self) {
        self.inner.data.clear();
        self.inner.cleared.store(true, Ordering::Release);
        self.inner.modified.store(true, Ordering::Release);
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| Error::Internal {
            operation: "load session: session middleware is not installed".to_string(),
        })
    }
}

/// Session store plus the cookie settings needed to find and persist sessions.
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
    secret: Arc<[u8]>,
}

impl Sessions {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig, secret: &[u8]) -> Self {
        Self {
            store,
            config: Arc::new(config),
            secret: Arc::from(secret),
        }
    }

    /// Build the store selected by `config.store`.
    pub async fn from_config(config: &SessionConfig, secret: &[u8]) -> anyhow::Result<Self> {
        let store: Arc<dyn SessionStore> = match config.store {
            SessionStoreKind::Memory => {
                warn!("Using the in-memory session store; sessions are lost on restart");
                Arc::new(MemoryStore::default())
            }
            SessionStoreKind::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("session store is redis but no redis url is configured"))?;
                Arc::new(RedisStore::connect(url, &config.key_prefix).await?)
            }
        };
        Ok(Self::new(store, config.clone(), secret))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Load the session named by the request cookie, or start a new one.
    pub async fn load(&self, headers: &axum::http::HeaderMap) -> Session {
        let Some(sid) = cookie::session_id_from_headers(headers, &self.config, &self.secret) else {
            return Session::new();
        };

        match self.store.load(&sid).await {
            Ok(Some(data)) => Session::from_store(sid, data),
            Ok(None) => {
                debug!("Session cookie refers to an unknown or expired session");
                Session::new()
            }
            Err(e) => {
                error!("Failed to load session, starting a new one: {}", e);
                Session::new()
            }
        }
    }

    /// Persist `session` and return the `Set-Cookie` value to send, if any.
    pub async fn persist(&self, session: &Session) -> Option<String> {
        let config = &self.config;

        if session.is_cleared() {
            if session.is_existing()
                && let Err(e) = self.store.delete(session.id()).await
            {
                error!("Failed to delete session: {}", e);
            }

            if session.is_empty() {
                return session.is_existing().then(|| cookie::expired_cookie(config));
            }

            // Repopulated after being cleared: continue under a new id
            let renewed = Session::new();
            let sid = renewed.id().to_string();
            return self.save(&sid, &session.snapshot()).await;
        }

        if session.is_empty() {
            return None;
        }

        let refresh = config.refresh_each_request && session.is_existing();
        if session.is_modified() || refresh {
            return self.save(session.id(), &session.snapshot()).await;
        }
        None
    }

    async fn save(&self, sid: &str, data: &SessionData) -> Option<String> {
        if let Err(e) = self.store.save(sid, data, self.config.lifetime).await {
            error!("Failed to save session: {}", e);
            return None;
        }
        cookie::session_cookie(sid, &self.config, &self.secret)
    }
}

/// Load the session before the handler runs and persist it afterwards.
#[instrument(skip_all, name = "session")]
pub async fn session_middleware(State(sessions): State<Sessions>, mut request: Request, next: Next) -> Response {
    let session = sessions.load(request.headers()).await;
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Some(set_cookie) = sessions.persist(&session).await {
        match HeaderValue::from_str(&set_cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Session cookie is not a valid header value: {}", e),
        }
    }

    response
}
