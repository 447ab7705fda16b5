use chrono::{DateTime, Utc};

use super::repository::{fetch_user, user_record_from_row, Repository, USER_RECORD_COLUMNS};
use crate::errors::{codes, AppError};
use crate::models::{RegisterRequest, Role, User, UserRecord};

impl Repository {
    // ==================== USER OPERATIONS ====================

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await
    }

    /// Find a user with credentials by email, ignoring case.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_record_from_row))
    }

    /// Create an inactive account holding a verification code.
    ///
    /// `deliver` runs inside the transaction; the account is only committed
    /// when it succeeds.
    pub async fn register_user<F>(
        &self,
        request: &RegisterRequest,
        password_hash: &str,
        verification_code: &str,
        code_expiry: DateTime<Utc>,
        deliver: F,
    ) -> Result<User, AppError>
    where
        F: FnOnce(&User) -> Result<(), AppError>,
    {
        let email = request.email.trim();
        let mut tx = self.pool.begin().await?;

        let taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(email_taken());
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            role: if request.is_manager {
                Role::Manager
            } else {
                Role::Developer
            },
            is_active: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, email, first_name, last_name, role, is_active, password_hash, verification_code, verification_code_expiry, created_at) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)"
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(password_hash)
        .bind(verification_code)
        .bind(code_expiry)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                email_taken()
            } else {
                AppError::from(e)
            }
        })?;

        deliver(&user)?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "user registered");
        Ok(user)
    }

    /// Activate an account and clear its verification code.
    pub async fn activate_user(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET is_active = 1, verification_code = NULL, verification_code_expiry = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    /// Store a password reset code; `deliver` runs before the commit.
    pub async fn store_reset_code<F>(&self, id: &str, reset_code: &str, deliver: F) -> Result<(), AppError>
    where
        F: FnOnce() -> Result<(), AppError>,
    {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE users SET reset_code = ? WHERE id = ?")
            .bind(reset_code)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        deliver()?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace the password hash and clear the reset code.
    pub async fn reset_password(&self, id: &str, password_hash: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = ?, reset_code = NULL WHERE id = ?")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    /// Delete a user and, through cascades, everything they own.
    pub async fn delete_user(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        tracing::info!(user_id = id, "user deleted");
        Ok(())
    }
}

fn email_taken() -> AppError {
    AppError::Validation {
        code: codes::EMAIL_TAKEN,
        message: "A user with this email already exists.".to_string(),
    }
}
