//! Row types for the panel's tables.
//!
//! Timestamps are left out: they are written by column defaults and the `Any` driver has no
//! portable timestamp type.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{PermissionId, RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserModel {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
    pub role_id: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleModel {
    pub id: RoleId,
    pub role_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PermissionModel {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RolePermissionModel {
    pub id: i64,
    pub role_id: RoleId,
    pub permission_id: PermissionId,
}

/// A user joined with its role, as returned by the `get_user_by_login` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub user_id: UserId,
    pub login: String,
    pub password_hash: String,
    pub role_name: String,
}
