//! Data-access seams used by the controller.
//!
//! The controller only sees these traits. [`users::Users`] backs [`UserRepository`] with the
//! named queries of the [`DbHelper`](crate::db::DbHelper), and the request-scoped
//! [`Session`](crate::session::Session) implements [`SessionManager`].

pub mod session;
pub mod users;

pub use session::SessionManager;
pub use users::{UserRepository, Users};
