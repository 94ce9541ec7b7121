//! Server-side session storage.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use moka::{Expiry, future::Cache};
use redis::{AsyncCommands, aio::ConnectionManager};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// The key/value pairs of one session.
pub type SessionData = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode session data: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionStoreError>;

/// Persistence for session data, keyed by session id.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// `None` when the session does not exist or has expired.
    async fn load(&self, sid: &str) -> Result<Option<SessionData>>;

    /// Write the whole session, replacing what was stored. It expires `ttl` after this call.
    async fn save(&self, sid: &str, data: &SessionData, ttl: Duration) -> Result<()>;

    async fn delete(&self, sid: &str) -> Result<()>;
}

#[derive(Clone)]
struct StoredSession {
    data: SessionData,
    ttl: Duration,
}

struct SessionExpiry;

impl Expiry<String, StoredSession> for SessionExpiry {
    fn expire_after_create(&self, _key: &String, value: &StoredSession, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredSession,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store. Sessions do not survive a restart and are not shared between instances.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, StoredSession>,
}

impl MemoryStore {
    pub fn new(max_sessions: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_sessions)
            .expire_after(SessionExpiry)
            .build();
        Self { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, sid: &str) -> Result<Option<SessionData>> {
        Ok(self.cache.get(sid).await.map(|stored| stored.data))
    }

    async fn save(&self, sid: &str, data: &SessionData, ttl: Duration) -> Result<()> {
        self.cache
            .insert(
                sid.to_string(),
                StoredSession {
                    data: data.clone(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, sid: &str) -> Result<()> {
        self.cache.invalidate(sid).await;
        Ok(())
    }
}

pub fn redis_key(prefix: &str, sid: &str) -> String {
    format!("{prefix}{sid}")
}

/// Sessions stored as JSON strings in Redis, expired with `SET EX`.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    #[instrument(skip(url), err)]
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis session store");
        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisStore {
    async fn load(&self, sid: &str) -> Result<Option<SessionData>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(redis_key(&self.key_prefix, sid)).await?;
        raw.map(|json| serde_json::from_str(&json)).transpose().map_err(Into::into)
    }

    async fn save(&self, sid: &str, data: &SessionData, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(data)?;
        let mut conn = self.conn.clone();
        // Redis rejects an expiry of 0
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(redis_key(&self.key_prefix, sid), json, seconds).await?;
        debug!(seconds, "Session saved to Redis");
        Ok(())
    }

    async fn delete(&self, sid: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(redis_key(&self.key_prefix, sid)).await?;
        Ok(())
    }
}
