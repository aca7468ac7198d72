//! User store.
//!
//! Backs the session layer's `UserLookup` and `CredentialStore` interfaces
//! and provides provisioning for the CLI.

mod models;
mod repository;
mod service;

pub use models::{CreateUserRequest, User};
pub use repository::UserRepository;
pub use service::{UserService, hash_password};
