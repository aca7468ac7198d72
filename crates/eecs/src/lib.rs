//! EECS program administration backend.
//!
//! JWT login against the legacy admin user store, and the session gate that
//! resolves the current principal for protected endpoints.

pub mod api;
pub mod auth;
pub mod db;
pub mod user;
