//! Application state shared across handlers.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{AuthState, SessionConfig};
use crate::user::UserService;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub users: UserService,
    /// Allowed CORS origins.
    pub allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    /// Wire the session pipeline to the user service.
    pub fn new(session: SessionConfig, users: UserService, allowed_origins: Vec<String>) -> Self {
        let store = Arc::new(users.clone());
        Self {
            auth: AuthState::new(session, store.clone(), store),
            users,
            allowed_origins: Arc::new(allowed_origins),
        }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
