//! ABOUTME: User repository with account lookup and payout account management
//! ABOUTME: Backs registration, login and the seller payout settings

use pm_core::{now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

use crate::map_db_error;

const USER_COLUMNS: &str =
    "id, email, username, password_hash, role, payout_account_id, is_active, created_at, updated_at";

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub payout_account_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Request to create a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// User repository
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user; a taken email is a conflict
    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<User> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating user with id: {}", id);

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, username, password_hash, role, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&id)
        .bind(request.email.to_lowercase())
        .bind(request.username)
        .bind(request.password_hash)
        .bind(request.role)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_db_error("Failed to create user", e))?;

        debug!("Successfully created user: {}", user.id);
        Ok(user)
    }

    /// Find a user by ID
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        debug!("Finding user by id: {}", id);

        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find user by id: {}", e)))
    }

    /// Find a user by email, case-insensitively
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        debug!("Finding user by email: {}", email);

        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?1",
            USER_COLUMNS
        ))
        .bind(email.to_lowercase())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find user by email: {}", e)))
    }

    /// Whether any user exists at all
    pub async fn has_any_users(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count users: {}", e)))?;

        Ok(count > 0)
    }

    /// Store the connected account payouts are sent to
    #[instrument(skip(self))]
    pub async fn set_payout_account(&self, id: &str, account_id: &str) -> Result<User> {
        debug!("Setting payout account for user: {}", id);

        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET payout_account_id = ?1, updated_at = ?2 WHERE id = ?3 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(account_id)
        .bind(now_iso8601())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to set payout account: {}", e)))?
        .ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    /// Deactivate a user; deactivated users cannot log in
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ?1 WHERE id = ?2")
            .bind(now_iso8601())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to deactivate user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("User not found".to_string()));
        }
        Ok(())
    }
}
