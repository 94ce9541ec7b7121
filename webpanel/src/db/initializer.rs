//! Seeds permissions, roles and users from a YAML file.
//!
//! ```yaml
//! default_permissions:
//!   - name: read
//!     description: Read access
//! default_role_name:
//!   - role_name: admin
//!     description: Administrator
//!     permissions: [read, write]
//! default_users:
//!   - login: admin
//!     password: change-me
//!     role_name: admin
//! ```
//!
//! Every row is looked up by its natural key first, so running the seed twice is harmless.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use sqlx::AnyConnection;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::errors::{DbError, Result};
use crate::auth::password::{self, Argon2Params};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Seed file {} not found", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to read seed file {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse seed file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid seed file: expected a mapping at the top level")]
    NotAMapping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPermission {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRole {
    pub role_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub login: String,
    pub password: String,
    pub role_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub default_permissions: Vec<SeedPermission>,
    #[serde(default)]
    pub default_role_name: Vec<SeedRole>,
    #[serde(default)]
    pub default_users: Vec<SeedUser>,
}

#[derive(Debug, Clone)]
pub struct DatabaseInitializer {
    seed: SeedData,
    argon2: Option<Argon2Params>,
}

impl DatabaseInitializer {
    pub fn from_yaml(path: impl AsRef<Path>, argon2: Option<Argon2Params>) -> std::result::Result<Self, SeedError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading seed file");

        let source = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), "Failed to read seed file: {}", e);
            match e.kind() {
                std::io::ErrorKind::NotFound => SeedError::FileNotFound { path: path.to_path_buf() },
                _ => SeedError::Io {
                    path: path.to_path_buf(),
                    source: e,
                },
            }
        })?;

        Self::from_yaml_str(&source, argon2)
    }

    pub fn from_yaml_str(source: &str, argon2: Option<Argon2Params>) -> std::result::Result<Self, SeedError> {
        let value: Value = serde_yaml::from_str(source)?;
        if !value.is_mapping() {
            return Err(SeedError::NotAMapping);
        }
        let seed = serde_yaml::from_value(value)?;
        Ok(Self { seed, argon2 })
    }

    pub fn seed(&self) -> &SeedData {
        &self.seed
    }

    /// Insert whatever part of the seed is missing. Runs inside the caller's transaction.
    pub async fn run(&self, conn: &mut AnyConnection) -> Result<()> {
        info!("Seeding database");

        let mut permission_ids = HashMap::new();
        for permission in &self.seed.default_permissions {
            let id = get_or_create_permission(conn, permission).await?;
            permission_ids.insert(permission.name.as_str(), id);
        }

        for role in &self.seed.default_role_name {
            let role_id = get_or_create_role(conn, role).await?;
            for name in &role.permissions {
                let permission_id = match permission_ids.get(name.as_str()) {
                    Some(id) => *id,
                    None => match find_id(conn, "SELECT id FROM permission WHERE name = $1", name).await? {
                        Some(id) => id,
                        None => {
                            warn!(role = %role.role_name, permission = %name, "Unknown permission in role, skipping");
                            continue;
                        }
                    },
                };
                grant_permission(conn, role_id, permission_id).await?;
            }
        }

        for user in &self.seed.default_users {
            let Some(role_id) = find_id(conn, "SELECT id FROM role WHERE role_name = $1", &user.role_name).await? else {
                error!(login = %user.login, role = %user.role_name, "Role not found for seeded user");
                return Err(DbError::ForeignKeyViolation {
                    constraint: None,
                    table: Some("users".to_string()),
                    message: format!("role '{}' for user '{}' not found", user.role_name, user.login),
                });
            };
            get_or_create_user(conn, user, role_id, self.argon2).await?;
        }

        info!("Database seeding finished");
        Ok(())
    }
}

async fn find_id(conn: &mut AnyConnection, sql: &str, key: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(sql).bind(key).fetch_optional(&mut *conn).await?;
    Ok(row.map(|(id,)| id))
}

async fn get_or_create_permission(conn: &mut AnyConnection, permission: &SeedPermission) -> Result<i64> {
    if let Some(id) = find_id(conn, "SELECT id FROM permission WHERE name = $1", &permission.name).await? {
        return Ok(id);
    }

    let (id,): (i64,) = sqlx::query_as("INSERT INTO permission (name, description) VALUES ($1, $2) RETURNING id")
        .bind(&permission.name)
        .bind(&permission.description)
        .fetch_one(&mut *conn)
        .await?;
    info!(name = %permission.name, id, "Permission created");
    Ok(id)
}

async fn get_or_create_role(conn: &mut AnyConnection, role: &SeedRole) -> Result<i64> {
    if let Some(id) = find_id(conn, "SELECT id FROM role WHERE role_name = $1", &role.role_name).await? {
        return Ok(id);
    }

    let (id,): (i64,) = sqlx::query_as("INSERT INTO role (role_name, description) VALUES ($1, $2) RETURNING id")
        .bind(&role.role_name)
        .bind(&role.description)
        .fetch_one(&mut *conn)
        .await?;
    info!(role_name = %role.role_name, id, "Role created");
    Ok(id)
}

async fn grant_permission(conn: &mut AnyConnection, role_id: i64, permission_id: i64) -> Result<()> {
    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM role_permission WHERE role_id = $1 AND permission_id = $2")
        .bind(role_id)
        .bind(permission_id)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    sqlx::query("INSERT INTO role_permission (role_id, permission_id) VALUES ($1, $2)")
        .bind(role_id)
        .bind(permission_id)
        .execute(&mut *conn)
        .await?;
    debug!(role_id, permission_id, "Permission granted");
    Ok(())
}

async fn get_or_create_user(conn: &mut AnyConnection, user: &SeedUser, role_id: i64, argon2: Option<Argon2Params>) -> Result<i64> {
    if let Some(id) = find_id(conn, "SELECT id FROM users WHERE login = $1", &user.login).await? {
        return Ok(id);
    }

    let plain = user.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain, argon2))
        .await
        .map_err(|e| DbError::Other(anyhow::anyhow!("password hashing task failed: {e}")))?
        .map_err(|e| DbError::Other(anyhow::anyhow!("{e}")))?;

    let (id,): (i64,) = sqlx::query_as("INSERT INTO users (login, password_hash, role_id) VALUES ($1, $2, $3) RETURNING id")
        .bind(&user.login)
        .bind(password_hash)
        .bind(role_id)
        .fetch_one(&mut *conn)
        .await?;
    info!(login = %user.login, id, "User created");
    Ok(id)
}
