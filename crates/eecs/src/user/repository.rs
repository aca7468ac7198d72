//! User repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::User;

const USER_COLUMNS: &str =
    "username, password_hash, is_active, is_staff, created_at, last_login_at";

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user whose password is already hashed.
    #[instrument(skip(self, password_hash))]
    pub async fn create(&self, username: &str, password_hash: &str, is_staff: bool) -> Result<User> {
        debug!("Creating user: {}", username);

        sqlx::query("INSERT INTO users (username, password_hash, is_staff) VALUES (?, ?, ?)")
            .bind(username)
            .bind(password_hash)
            .bind(is_staff)
            .execute(&self.pool)
            .await
            .context("Failed to insert user")?;

        self.get(username)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after creation"))
    }

    /// Get a user by username.
    #[instrument(skip(self))]
    pub async fn get(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        Ok(user)
    }

    /// Role names assigned to a user, sorted.
    #[instrument(skip(self))]
    pub async fn roles_for(&self, username: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.username = ?
            ORDER BY r.name
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user roles")?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Assign a role, creating it if it does not exist yet.
    #[instrument(skip(self))]
    pub async fn assign_role(&self, username: &str, role: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(role)
            .execute(&self.pool)
            .await
            .context("Failed to insert role")?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO user_roles (username, role_id)
            SELECT ?, id FROM roles WHERE name = ?
            "#,
        )
        .bind(username)
        .bind(role)
        .execute(&self.pool)
        .await
        .context("Failed to assign role")?;

        Ok(())
    }

    /// Enable or disable an account.
    #[instrument(skip(self))]
    pub async fn set_active(&self, username: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE username = ?")
            .bind(is_active)
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to update user")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("User not found: {}", username));
        }

        Ok(())
    }

    /// Change a username. Role assignments follow the rename.
    #[instrument(skip(self))]
    pub async fn rename(&self, username: &str, new_username: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET username = ? WHERE username = ?")
            .bind(new_username)
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to rename user")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("User not found: {}", username));
        }

        Ok(())
    }

    /// Delete a user.
    #[instrument(skip(self))]
    pub async fn delete(&self, username: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("User not found: {}", username));
        }

        Ok(())
    }

    /// Update last login timestamp.
    #[instrument(skip(self))]
    pub async fn update_last_login(&self, username: &str) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = datetime('now') WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await
            .context("Failed to update last login")?;

        Ok(())
    }

    /// Check if a username is available.
    #[instrument(skip(self))]
    pub async fn is_username_available(&self, username: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check username availability")?;

        Ok(count.0 == 0)
    }
}
