//! User service: provisioning plus the lookups the session layer consumes.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{info, instrument};

use super::models::{CreateUserRequest, User};
use super::repository::UserRepository;
use crate::auth::{CredentialRecord, CredentialStore, Principal, UserLookup};

const MIN_PASSWORD_LEN: usize = 6;

/// Service for user management operations.
#[derive(Debug, Clone)]
pub struct UserService {
    repo: UserRepository,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(repo: UserRepository, bcrypt_cost: u32) -> Self {
        Self { repo, bcrypt_cost }
    }

    /// Create a new user with validation.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        if !is_valid_username(&request.username) {
            bail!(
                "Invalid username format. Must be 3-150 letters, digits or @.+-_ characters."
            );
        }

        if request.password.len() < MIN_PASSWORD_LEN {
            bail!("Password must be at least {MIN_PASSWORD_LEN} characters.");
        }

        if !self.repo.is_username_available(&request.username).await? {
            bail!("Username '{}' is already taken.", request.username);
        }

        let password_hash = hash_password(&request.password, self.bcrypt_cost)?;
        let user = self
            .repo
            .create(&request.username, &password_hash, request.is_staff)
            .await?;

        for role in &request.roles {
            self.repo.assign_role(&user.username, role).await?;
        }

        info!(username = %user.username, roles = ?request.roles, "Created new user");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.repo.get(username).await
    }

    /// Session identity of an active user. Inactive accounts resolve to
    /// `None`, so their outstanding tokens stop working as soon as they are
    /// disabled.
    #[instrument(skip(self))]
    pub async fn principal(&self, username: &str) -> Result<Option<Principal>> {
        let Some(user) = self.repo.get(username).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }
        let roles = self.repo.roles_for(&user.username).await?;
        Ok(Some(user.into_principal(roles)))
    }

    #[instrument(skip(self))]
    pub async fn deactivate_user(&self, username: &str) -> Result<()> {
        self.repo.set_active(username, false).await?;
        info!(username, "Deactivated user");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn rename_user(&self, username: &str, new_username: &str) -> Result<()> {
        if !is_valid_username(new_username) {
            bail!("Invalid username format.");
        }
        self.repo.rename(username, new_username).await?;
        info!(username, new_username, "Renamed user");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, username: &str) -> Result<()> {
        self.repo.delete(username).await?;
        info!(username, "Deleted user");
        Ok(())
    }

    /// Record a successful login.
    #[instrument(skip(self))]
    pub async fn record_login(&self, username: &str) -> Result<()> {
        self.repo.update_last_login(username).await
    }
}

#[async_trait]
impl UserLookup for UserService {
    async fn lookup_user(&self, identifier: &str) -> Result<Option<Principal>> {
        self.principal(identifier).await
    }
}

#[async_trait]
impl CredentialStore for UserService {
    async fn credential_record(&self, username: &str) -> Result<Option<CredentialRecord>> {
        let Some(user) = self.repo.get(username).await? else {
            return Ok(None);
        };
        let roles = self.repo.roles_for(&user.username).await?;
        let password_hash = user.password_hash.clone();
        let is_active = user.is_active;

        Ok(Some(CredentialRecord {
            principal: user.into_principal(roles),
            password_hash,
            is_active,
        }))
    }

    fn hash_cost(&self) -> u32 {
        self.bcrypt_cost
    }
}

/// Usernames follow the legacy admin rules: 3-150 characters of letters,
/// digits and `@.+-_`.
fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    if !(3..=150).contains(&len) {
        return false;
    }

    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// Hash a password using bcrypt.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialVerifier, Verification, verify_password};
    use crate::db::Database;
    use std::sync::Arc;

    async fn service() -> UserService {
        let db = Database::in_memory().await.unwrap();
        UserService::new(UserRepository::new(db.pool().clone()), 4)
    }

    fn request(username: &str, password: &str, roles: &[&str]) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            password: password.to_string(),
            is_staff: false,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_is_valid_username() {
        assert!(is_valid_username("eecs"));
        assert!(is_valid_username("user.name@dept"));
        assert!(is_valid_username("user-name_1"));
        assert!(!is_valid_username("ab")); // too short
        assert!(!is_valid_username("user name")); // space
        assert!(!is_valid_username("user/name"));
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("test_password", 4).unwrap();
        assert!(verify_password(&hash, "test_password"));
        assert!(!verify_password(&hash, "wrong_password"));
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let users = service().await;
        users
            .create_user(request("alice", "wonderland", &["major_manager"]))
            .await
            .unwrap();

        let principal = users.lookup_user("alice").await.unwrap().unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.roles, vec!["major_manager".to_string()]);

        assert!(users.lookup_user("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let users = service().await;
        users.create_user(request("alice", "wonderland", &[])).await.unwrap();
        let err = users
            .create_user(request("alice", "other-password", &[]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already taken"));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let users = service().await;
        assert!(users.create_user(request("alice", "abc", &[])).await.is_err());
    }

    #[tokio::test]
    async fn test_password_not_stored_in_plaintext() {
        let users = service().await;
        let user = users
            .create_user(request("alice", "wonderland", &[]))
            .await
            .unwrap();
        assert_ne!(user.password_hash, "wonderland");
        assert!(user.password_hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_inactive_user_not_resolved() {
        let users = service().await;
        users.create_user(request("alice", "wonderland", &[])).await.unwrap();
        assert!(users.principal("alice").await.unwrap().is_some());

        users.deactivate_user("alice").await.unwrap();
        assert!(users.principal("alice").await.unwrap().is_none());
        assert!(users.lookup_user("alice").await.unwrap().is_none());

        // The row itself is kept.
        let user = users.get_user("alice").await.unwrap().unwrap();
        assert!(!user.is_active);
    }

    #[tokio::test]
    async fn test_staff_flag_persisted() {
        let users = service().await;
        users
            .create_user(CreateUserRequest {
                is_staff: true,
                ..request("alice", "wonderland", &[])
            })
            .await
            .unwrap();
        users.create_user(request("bob", "builder", &[])).await.unwrap();

        assert!(users.get_user("alice").await.unwrap().unwrap().is_staff);
        assert!(!users.get_user("bob").await.unwrap().unwrap().is_staff);
    }

    #[tokio::test]
    async fn test_rename_moves_roles() {
        let users = service().await;
        users
            .create_user(request("alice", "wonderland", &["course_manager"]))
            .await
            .unwrap();
        users.rename_user("alice", "alicia").await.unwrap();

        assert!(users.lookup_user("alice").await.unwrap().is_none());
        let principal = users.lookup_user("alicia").await.unwrap().unwrap();
        assert!(principal.has_role("course_manager"));
    }

    #[tokio::test]
    async fn test_verifier_against_store() {
        let users = service().await;
        users.create_user(request("alice", "wonderland", &[])).await.unwrap();
        let verifier = CredentialVerifier::new(Arc::new(users));

        assert!(matches!(
            verifier.authenticate("alice", "wonderland").await,
            Verification::Verified(_)
        ));
        assert!(matches!(
            verifier.authenticate("alice", "nope").await,
            Verification::CredentialMismatch
        ));
    }

    #[tokio::test]
    async fn test_record_login() {
        let users = service().await;
        users.create_user(request("alice", "wonderland", &[])).await.unwrap();
        users.record_login("alice").await.unwrap();
        let user = users.get_user("alice").await.unwrap().unwrap();
        assert!(user.last_login_at.is_some());
    }
}
