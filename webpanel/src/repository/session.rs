//! Session access as seen by the controller.

/// Key/value access to the current user's session.
///
/// Implementations are request-scoped; writes become visible to later requests once the
/// session middleware has persisted them.
pub trait SessionManager: Send + Sync {
    fn set(&self, key: &str, value: &str);

    fn get(&self, key: &str) -> Option<String>;

    fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn remove(&self, key: &str) -> Option<String>;

    /// Remove every key and end the session.
    fn clear(&self);
}
