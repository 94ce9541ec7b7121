//! Credential handling.
//!
//! Passwords are stored as Argon2id PHC strings. Hashing happens when the seed file is loaded;
//! verification happens on every login attempt in [`crate::controllers::MainController`].

pub mod password;
