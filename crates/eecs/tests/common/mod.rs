//! Test utilities and common setup.
#![allow(dead_code)]

use axum::Router;
use sqlx::SqlitePool;
use eecs::api::{self, AppState};
use eecs::auth::{AuthConfig, NotAuthenticatedConfig, TokenCodec};
use eecs::db::Database;
use eecs::user::{CreateUserRequest, UserRepository, UserService};

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";
pub const ALICE_PASSWORD: &str = "alicepassword123";

/// Create a test AuthConfig with a JWT secret for testing.
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: Some(TEST_SECRET.to_string()),
        bcrypt_cost: 4,
        ..AuthConfig::default()
    }
}

/// Config accepting tokens from both the cookie and the header.
pub fn cookie_auth_config() -> AuthConfig {
    AuthConfig {
        use_cookie: true,
        ..test_auth_config()
    }
}

/// Config allowing one cross-origin frontend.
pub fn cors_auth_config(origin: &str) -> AuthConfig {
    AuthConfig {
        allowed_origins: vec![origin.to_string()],
        ..test_auth_config()
    }
}

/// Config replacing the 401 challenge with a redirect-style fault.
pub fn custom_fault_auth_config() -> AuthConfig {
    AuthConfig {
        not_authenticated: Some(NotAuthenticatedConfig {
            status: 403,
            detail: "Please log in".to_string(),
        }),
        ..test_auth_config()
    }
}

pub struct TestApp {
    pub router: Router,
    pub users: UserService,
    pub codec: TokenCodec,
    /// Closing it makes every store query fail.
    pub pool: SqlitePool,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Create a test application with the default config.
pub async fn test_app() -> TestApp {
    test_app_with(test_auth_config()).await
}

/// Create a test application seeded with `alice` (major manager) and
/// `bob` (no roles).
pub async fn test_app_with(config: AuthConfig) -> TestApp {
    let db = Database::in_memory()
        .await
        .expect("Failed to create test database");
    let users = UserService::new(UserRepository::new(db.pool().clone()), config.bcrypt_cost);

    users
        .create_user(CreateUserRequest {
            username: "alice".to_string(),
            password: ALICE_PASSWORD.to_string(),
            is_staff: true,
            roles: vec!["major_manager".to_string()],
        })
        .await
        .expect("Failed to create alice");
    users
        .create_user(CreateUserRequest {
            username: "bob".to_string(),
            password: "bobpassword123".to_string(),
            is_staff: false,
            roles: Vec::new(),
        })
        .await
        .expect("Failed to create bob");

    let session = config.session_config().expect("valid session config");
    let codec = TokenCodec::new(&session);
    let state = AppState::new(session, users.clone(), config.allowed_origins.clone());

    TestApp {
        router: api::create_router(state),
        users,
        codec,
        pool: db.pool().clone(),
    }
}
