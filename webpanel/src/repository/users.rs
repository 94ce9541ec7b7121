//! User lookups.

use tracing::{debug, instrument};

use crate::db::{
    DbHelper,
    models::{PermissionModel, UserRecord},
};

/// Read access to users and what their roles grant.
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch a user and its role name by login. Unknown logins and database failures both
    /// yield `None`.
    async fn get_user_by_login(&self, login: &str) -> Option<UserRecord>;

    /// Permissions granted to a role, sorted by name.
    async fn get_role_permissions(&self, role_name: &str) -> Vec<PermissionModel>;
}

/// [`UserRepository`] over the `users` query category.
#[derive(Clone, Debug)]
pub struct Users {
    helper: DbHelper,
}

impl Users {
    pub fn new(helper: DbHelper) -> Self {
        Self { helper }
    }
}

#[async_trait::async_trait]
impl UserRepository for Users {
    #[instrument(skip(self))]
    async fn get_user_by_login(&self, login: &str) -> Option<UserRecord> {
        let mut rows: Vec<UserRecord> = self.helper.execute_query("get_user_by_login", &[("login", login.into())]).await;

        if rows.len() > 1 {
            debug!(count = rows.len(), "Several users share a login, using the first");
        }
        (!rows.is_empty()).then(|| rows.swap_remove(0))
    }

    #[instrument(skip(self))]
    async fn get_role_permissions(&self, role_name: &str) -> Vec<PermissionModel> {
        self.helper
            .execute_query("get_role_permissions", &[("role_name", role_name.into())])
            .await
    }
}
