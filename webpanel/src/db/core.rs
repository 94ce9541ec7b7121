//! Connection pool ownership, transactions, and table lifecycle.

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{
    AnyConnection, AnyPool,
    any::{AnyPoolOptions, install_default_drivers},
};
use tracing::{debug, error, info, instrument, warn};

use super::errors::{DbError, Result};
use super::initializer::DatabaseInitializer;
use super::schema::Dialect;
use crate::config::{DatabaseConfig, PoolSettings};

/// Shared handle to the application database.
///
/// Cloning is cheap; every clone uses the same pool.
#[derive(Clone, Debug)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
}

fn secs_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Database {
    /// Open a pool for `config.url`.
    #[instrument(skip_all, err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
            error!("Database URL is not configured");
            DbError::NotInitialized
        })?;

        Self::connect_with(url, &config.pool).await
    }

    pub async fn connect_with(url: &str, settings: &PoolSettings) -> Result<Self> {
        install_default_drivers();
        let dialect = Dialect::from_url(url)?;

        let pool = AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout(secs_or_none(settings.idle_timeout_secs))
            .max_lifetime(secs_or_none(settings.max_lifetime_secs))
            .connect(url)
            .await
            .map_err(|e| {
                error!(?dialect, "Failed to connect to database: {}", e);
                DbError::from(e)
            })?;

        info!(?dialect, max_connections = settings.max_connections, "Database pool ready");
        Ok(Self { pool, dialect })
    }

    pub fn pool(&self) -> Result<&AnyPool> {
        if self.pool.is_closed() {
            return Err(DbError::NotInitialized);
        }
        Ok(&self.pool)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds. When it fails the transaction is rolled back and the original
    /// error is returned.
    ///
    /// ```ignore
    /// db.transaction("count users", |conn| {
    ///     Box::pin(async move {
    ///         let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users").fetch_one(&mut *conn).await?;
    ///         Ok(n)
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn transaction<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut tx = self.pool()?.begin().await.map_err(|e| {
            error!(operation, "Failed to open transaction: {}", e);
            DbError::from(e)
        })?;
        debug!(operation, "Transaction opened");

        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(|e| {
                    error!(operation, "Failed to commit transaction: {}", e);
                    DbError::from(e)
                })?;
                debug!(operation, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                error!(operation, "Transaction failed, rolling back: {}", err);
                if let Err(e) = tx.rollback().await {
                    error!(operation, "Rollback failed: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Create every table (when missing) and load the seed, as one transaction.
    #[instrument(skip_all, err)]
    pub async fn create_tables(&self, initializer: &DatabaseInitializer) -> Result<()> {
        let statements = self.dialect.create_statements();
        let initializer = initializer.clone();

        self.transaction("create tables", move |conn| {
            Box::pin(async move {
                for statement in statements {
                    sqlx::query(statement).execute(&mut *conn).await?;
                }
                initializer.run(conn).await
            })
        })
        .await?;

        info!("Database tables created and seeded");
        Ok(())
    }

    /// Drop every table owned by the panel. All data is lost.
    #[instrument(skip_all, err)]
    pub async fn drop_tables(&self) -> Result<()> {
        let statements = self.dialect.drop_statements();

        self.transaction("drop tables", move |conn| {
            Box::pin(async move {
                for statement in statements {
                    sqlx::query(statement).execute(&mut *conn).await?;
                }
                Ok(())
            })
        })
        .await?;

        warn!("All database tables dropped");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
