//! User data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::Principal;

/// User entity from database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

impl User {
    /// Session identity for this user.
    pub fn into_principal(self, roles: Vec<String>) -> Principal {
        Principal {
            username: self.username,
            roles,
        }
    }
}

/// Request to provision a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    /// Plaintext; hashed before it reaches the repository.
    pub password: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}
