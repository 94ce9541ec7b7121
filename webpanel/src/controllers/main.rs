//! Login and session-activity checks.

use std::sync::Arc;

use tracing::{error, instrument};

use super::schemas::{AuthUser, SchemaError};
use crate::audit;
use crate::auth::password;
use crate::db::models::PermissionModel;
use crate::repository::{SessionManager, UserRepository};
use crate::types::{AuditAction, UNKNOWN_ROLE, session_keys};

#[derive(Clone)]
pub struct MainController {
    users: Arc<dyn UserRepository>,
}

impl MainController {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Authenticate `input` and, on success, record the user in `session`.
    ///
    /// Returns `Ok(false)` for an unknown login or a wrong password, and `Err` when the input
    /// fails validation. The session is only written on success, after clearing it so the
    /// logged-in session is stored under a fresh id.
    #[instrument(skip(self, session), fields(login = %input.login), err(level = "debug"))]
    pub async fn auth_user(&self, session: &dyn SessionManager, input: AuthUser) -> Result<bool, SchemaError> {
        input.validate()?;

        let Some(user) = self.users.get_user_by_login(&input.login).await else {
            audit!(
                warn,
                input.login,
                UNKNOWN_ROLE,
                AuditAction::LoginFailed,
                ip = %input.ip_addr,
                reason = "user not found"
            );
            return Ok(false);
        };

        let hash = user.password_hash.clone();
        let candidate = input.password.clone();
        let verified = match tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash)).await {
            Ok(Ok(verified)) => verified,
            Ok(Err(e)) => {
                error!(user_id = user.user_id, "Stored password hash is unusable: {}", e);
                false
            }
            Err(e) => {
                error!("Password verification task failed: {}", e);
                false
            }
        };

        if !verified {
            audit!(
                warn,
                input.login,
                UNKNOWN_ROLE,
                AuditAction::LoginFailed,
                ip = %input.ip_addr,
                reason = "wrong password"
            );
            return Ok(false);
        }

        // Start over under a new session id; only the CSRF token carries across
        let csrf_token = session.get(session_keys::CSRF_TOKEN);
        session.clear();
        if let Some(token) = csrf_token {
            session.set(session_keys::CSRF_TOKEN, &token);
        }
        session.set(session_keys::USER_ID, &user.user_id.to_string());
        session.set(session_keys::ROLE_NAME, &user.role_name);
        session.set(session_keys::IP_ADDR, &input.ip_addr);

        audit!(
            info,
            input.login,
            user.role_name,
            AuditAction::LoginSuccess,
            user_id = user.user_id,
            ip = %input.ip_addr
        );
        Ok(true)
    }

    /// Whether `session` belongs to a logged-in user.
    ///
    /// A request from a different address than the one stored at login still counts as active,
    /// but is reported as an alert.
    #[instrument(skip(self, session))]
    pub fn check_activity_session(&self, session: &dyn SessionManager, ip_addr: &str) -> bool {
        let user_id = session.get(session_keys::USER_ID).filter(|id| !id.is_empty());
        let session_ip = session.get(session_keys::IP_ADDR).filter(|ip| !ip.is_empty());
        let role = session
            .get(session_keys::ROLE_NAME)
            .unwrap_or_else(|| UNKNOWN_ROLE.to_string());

        let Some(user_id) = user_id else {
            audit!(
                warn,
                UNKNOWN_ROLE,
                UNKNOWN_ROLE,
                AuditAction::SessionNotFound,
                ip = %ip_addr
            );
            return false;
        };

        match session_ip {
            Some(stored) if stored != ip_addr => {
                audit!(
                    warn,
                    user_id,
                    role,
                    AuditAction::SessionIpChange,
                    old_ip = %stored,
                    new_ip = %ip_addr,
                    alert = true
                );
            }
            _ => {
                audit!(info, user_id, role, AuditAction::SessionActive, ip = %ip_addr);
            }
        }
        true
    }

    /// End the user's session.
    pub fn logout(&self, session: &dyn SessionManager) {
        let user_id = session.get(session_keys::USER_ID);
        let role = session
            .get(session_keys::ROLE_NAME)
            .unwrap_or_else(|| UNKNOWN_ROLE.to_string());
        session.clear();

        if let Some(user_id) = user_id {
            audit!(info, user_id, role, AuditAction::Logout);
        }
    }

    /// Role and permissions of the logged-in user, if any.
    pub async fn current_permissions(&self, session: &dyn SessionManager) -> Option<(String, Vec<PermissionModel>)> {
        session.get(session_keys::USER_ID)?;
        let role = session.get(session_keys::ROLE_NAME)?;
        let permissions = self.users.get_role_permissions(&role).await;
        Some((role, permissions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::UserRecord;
    use crate::session::Session;
    use crate::test_utils::{TEST_ARGON2_PARAMS, capture_logs};
    use std::collections::HashMap;
    use test_log::test;

    /// Users held in memory, keyed by login.
    struct FakeUsers {
        users: HashMap<String, UserRecord>,
    }

    #[async_trait::async_trait]
    impl UserRepository for FakeUsers {
        async fn get_user_by_login(&self, login: &str) -> Option<UserRecord> {
            self.users.get(login).cloned()
        }

        async fn get_role_permissions(&self, role_name: &str) -> Vec<PermissionModel> {
            if role_name != "admin" {
                return Vec::new();
            }
            vec![PermissionModel {
                id: 1,
                name: "read".to_string(),
                description: None,
            }]
        }
    }

    fn controller() -> MainController {
        let hash = password::hash_password("correct_password", Some(TEST_ARGON2_PARAMS)).unwrap();
        let mut users = HashMap::new();
        users.insert(
            "valid_user".to_string(),
            UserRecord {
                user_id: 1,
                login: "valid_user".to_string(),
                password_hash: hash,
                role_name: "admin".to_string(),
            },
        );
        users.insert(
            "broken_hash".to_string(),
            UserRecord {
                user_id: 2,
                login: "broken_hash".to_string(),
                password_hash: "not-a-phc-string".to_string(),
                role_name: "user".to_string(),
            },
        );
        MainController::new(Arc::new(FakeUsers { users }))
    }

    #[test(tokio::test)]
    async fn test_auth_user_success_sets_session() {
        let controller = controller();
        let session = Session::new();

        let ok = controller
            .auth_user(&session, AuthUser::new("valid_user", "correct_password", "127.0.0.1"))
            .await
            .unwrap();

        assert!(ok);
        assert!(session.is_cleared());
        assert_eq!(session.get("user_id"), Some("1".to_string()));
        assert_eq!(session.get("role_name"), Some("admin".to_string()));
        assert_eq!(session.get("ip_addr"), Some("127.0.0.1".to_string()));
    }

    #[test(tokio::test)]
    async fn test_auth_user_drops_pre_login_state_except_csrf_token() {
        let controller = controller();
        let session = Session::new();
        session.set("csrf_token", "token-123");
        session.set("planted", "value");

        let ok = controller
            .auth_user(&session, AuthUser::new("valid_user", "correct_password", "127.0.0.1"))
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(session.get("csrf_token"), Some("token-123".to_string()));
        assert_eq!(session.get("planted"), None);
    }

    #[test(tokio::test)]
    async fn test_auth_user_wrong_password() {
        let controller = controller();
        let session = Session::new();

        let ok = controller
            .auth_user(&session, AuthUser::new("valid_user", "wrong_password", "127.0.0.1"))
            .await
            .unwrap();

        assert!(!ok);
        assert!(session.is_empty());
        assert!(!session.is_modified());
    }

    #[test(tokio::test)]
    async fn test_auth_user_unknown_user() {
        let controller = controller();
        let session = Session::new();

        let ok = controller
            .auth_user(&session, AuthUser::new("nonexistent", "whatever", "127.0.0.1"))
            .await
            .unwrap();

        assert!(!ok);
        assert!(session.is_empty());
    }

    #[test(tokio::test)]
    async fn test_auth_user_invalid_input_is_an_error() {
        let controller = controller();
        let session = Session::new();

        let err = controller
            .auth_user(&session, AuthUser::new("ab", "correct_password", "127.0.0.1"))
            .await
            .unwrap_err();

        assert!(err.has_field("login"));
        assert!(session.is_empty());
    }

    #[test(tokio::test)]
    async fn test_auth_user_unusable_hash_fails_closed() {
        let controller = controller();
        let session = Session::new();

        let ok = controller
            .auth_user(&session, AuthUser::new("broken_hash", "anything", "127.0.0.1"))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_check_activity_session_active() {
        let controller = controller();
        let session = Session::new();
        session.set("user_id", "1");
        session.set("ip_addr", "127.0.0.1");
        session.set("role_name", "admin");

        assert!(controller.check_activity_session(&session, "127.0.0.1"));
    }

    #[test]
    fn test_check_activity_session_ip_change_is_still_active() {
        let controller = controller();
        let session = Session::new();
        session.set("user_id", "1");
        session.set("ip_addr", "127.0.0.1");

        assert!(controller.check_activity_session(&session, "192.168.1.1"));
    }

    #[test]
    fn test_check_activity_session_without_user() {
        let controller = controller();
        let session = Session::new();
        session.set("ip_addr", "127.0.0.1");

        assert!(!controller.check_activity_session(&session, "127.0.0.1"));
        assert!(!controller.check_activity_session(&Session::new(), "127.0.0.1"));
    }

    #[test]
    fn test_logout_clears_session() {
        let controller = controller();
        let session = Session::new();
        session.set("user_id", "1");

        controller.logout(&session);
        assert!(session.is_cleared());
        assert!(!controller.check_activity_session(&session, "127.0.0.1"));
    }

    #[test(tokio::test)]
    async fn test_current_permissions() {
        let controller = controller();
        let session = Session::new();
        assert!(controller.current_permissions(&session).await.is_none());

        session.set("user_id", "1");
        session.set("role_name", "admin");
        let (role, permissions) = controller.current_permissions(&session).await.unwrap();
        assert_eq!(role, "admin");
        assert_eq!(permissions.len(), 1);
    }

    #[test(tokio::test)]
    async fn test_login_outcomes_are_audited() {
        let controller = controller();
        let (logs, _guard) = capture_logs();

        let session = Session::new();
        controller
            .auth_user(&session, AuthUser::new("nonexistent", "whatever", "10.0.0.5"))
            .await
            .unwrap();
        controller
            .auth_user(&session, AuthUser::new("valid_user", "wrong_password", "10.0.0.5"))
            .await
            .unwrap();

        let failed = logs.actions("login_failed");
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0]["target"], "webpanel::audit");
        assert_eq!(failed[0]["level"], "WARN");
        assert_eq!(failed[0]["fields"]["username"], "nonexistent");
        assert_eq!(failed[0]["fields"]["role"], "Unknown");
        assert_eq!(failed[0]["fields"]["reason"], "user not found");
        assert_eq!(failed[1]["fields"]["reason"], "wrong password");
        assert!(logs.actions("login_success").is_empty());

        controller
            .auth_user(&session, AuthUser::new("valid_user", "correct_password", "10.0.0.5"))
            .await
            .unwrap();
        let success = logs.actions("login_success");
        assert_eq!(success.len(), 1);
        assert_eq!(success[0]["level"], "INFO");
        assert_eq!(success[0]["fields"]["username"], "valid_user");
        assert_eq!(success[0]["fields"]["role"], "admin");
    }

    #[test]
    fn test_ip_change_raises_alert() {
        let controller = controller();
        let session = Session::new();
        session.set("user_id", "1");
        session.set("ip_addr", "127.0.0.1");
        session.set("role_name", "admin");

        let (logs, _guard) = capture_logs();
        assert!(controller.check_activity_session(&session, "192.168.1.1"));

        let alerts = logs.actions("session_ip_change");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["level"], "WARN");
        let fields = &alerts[0]["fields"];
        assert_eq!(fields["alert"], true);
        assert_eq!(fields["old_ip"], "127.0.0.1");
        assert_eq!(fields["new_ip"], "192.168.1.1");
        assert_eq!(fields["username"], "1");
        assert_eq!(fields["role"], "admin");
        assert!(logs.actions("session_active").is_empty());
    }

    #[test]
    fn test_session_activity_is_audited() {
        let controller = controller();
        let session = Session::new();
        session.set("user_id", "1");
        session.set("ip_addr", "127.0.0.1");

        let (logs, _guard) = capture_logs();
        assert!(controller.check_activity_session(&session, "127.0.0.1"));
        assert!(!controller.check_activity_session(&Session::new(), "127.0.0.1"));

        let active = logs.actions("session_active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["fields"]["role"], "Unknown");

        let missing = logs.actions("session_not_found");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0]["level"], "WARN");
        assert_eq!(missing[0]["fields"]["ip"], "127.0.0.1");
        assert!(logs.actions("session_ip_change").is_empty());
    }

    #[test]
    fn test_logout_is_audited_only_for_logged_in_users() {
        let controller = controller();
        let (logs, _guard) = capture_logs();

        controller.logout(&Session::new());
        assert!(logs.actions("logout").is_empty());

        let session = Session::new();
        session.set("user_id", "1");
        session.set("role_name", "admin");
        controller.logout(&session);

        let logouts = logs.actions("logout");
        assert_eq!(logouts.len(), 1);
        assert_eq!(logouts[0]["fields"]["username"], "1");
        assert_eq!(logouts[0]["fields"]["role"], "admin");
    }
}
