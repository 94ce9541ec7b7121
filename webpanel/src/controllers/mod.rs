//! Business logic between the views and the repositories.

pub mod main;
pub mod schemas;

pub use main::MainController;
