//! Common type definitions shared by the controller, the views and the session layer.

use std::fmt;

// Type aliases for IDs
pub type UserId = i64;
pub type RoleId = i64;
pub type PermissionId = i64;

/// Keys written into the server-side session.
pub mod session_keys {
    pub const USER_ID: &str = "user_id";
    pub const ROLE_NAME: &str = "role_name";
    pub const IP_ADDR: &str = "ip_addr";
    pub const CSRF_TOKEN: &str = "csrf_token";
}

/// Role reported for an active session that has no role stored.
pub const UNKNOWN_ROLE: &str = "Unknown";

/// User actions written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    LoginSuccess,
    LoginFailed,
    SessionActive,
    SessionIpChange,
    SessionNotFound,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::SessionActive => "session_active",
            AuditAction::SessionIpChange => "session_ip_change",
            AuditAction::SessionNotFound => "session_not_found",
            AuditAction::Logout => "logout",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit a user-action event under the `webpanel::audit` target.
///
/// ```ignore
/// audit!(warn, "mallory", "Unknown", AuditAction::SessionIpChange, stored_ip = "10.0.0.1");
/// ```
#[macro_export]
macro_rules! audit {
    ($level:ident, $username:expr, $role:expr, $action:expr $(, $($field:tt)+)?) => {
        ::tracing::$level!(
            target: "webpanel::audit",
            username = %$username,
            role = %$role,
            action = %$action,
            $($($field)+ ,)?
            "{}", $action
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_names() {
        assert_eq!(AuditAction::LoginSuccess.to_string(), "login_success");
        assert_eq!(AuditAction::SessionIpChange.to_string(), "session_ip_change");
        assert_eq!(AuditAction::SessionNotFound.as_str(), "session_not_found");
        assert_eq!(AuditAction::Logout.as_str(), "logout");
    }
}
