//! User model and CRUD operations.

use anyhow::{Context, Result};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// User record.
///
/// `menu_permissions` is the per-user grant column: a JSON array of menu
/// keys, already sanitized at write time. A user may additionally carry an
/// assigned role whose grant set combines with this one at resolution time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub pass: String,
    pub mail: String,
    pub is_admin: bool,
    pub role_id: Option<Uuid>,
    pub menu_permissions: Json<Vec<String>>,
    pub status: i16,
    pub created: DateTime<Utc>,
    pub login: Option<DateTime<Utc>>,
    pub access: Option<DateTime<Utc>>,
}

/// Input for creating a new user.
///
/// `menu_permissions` must already be sanitized against the catalog; the
/// model persists what it is given.
#[derive(Debug)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub mail: String,
    pub is_admin: bool,
    pub role_id: Option<Uuid>,
    pub menu_permissions: Vec<String>,
}

/// Input for updating a user's profile fields.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub mail: Option<String>,
    pub is_admin: Option<bool>,
    pub status: Option<i16>,
}

impl User {
    /// Check if this user is active.
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    /// The user's own grant keys, without any assigned-role contribution.
    pub fn own_grants(&self) -> &[String] {
        &self.menu_permissions.0
    }

    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by id")?;

        Ok(user)
    }

    /// Find a user by username.
    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by username")?;

        Ok(user)
    }

    /// Find a user by email address.
    pub async fn find_by_mail(pool: &PgPool, mail: &str) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE mail = $1")
            .bind(mail)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by mail")?;

        Ok(user)
    }

    /// Create a new user.
    pub async fn create(pool: &PgPool, input: CreateUser) -> Result<Self> {
        let id = Uuid::now_v7();
        let pass = hash_password(&input.password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, pass, mail, is_admin, role_id, menu_permissions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.username)
        .bind(&pass)
        .bind(&input.mail)
        .bind(input.is_admin)
        .bind(input.role_id)
        .bind(Json(&input.menu_permissions))
        .fetch_one(pool)
        .await
        .context("failed to create user")?;

        Ok(user)
    }

    /// Update a user's profile fields.
    pub async fn update(pool: &PgPool, id: Uuid, input: UpdateUser) -> Result<Option<Self>> {
        // Build dynamic update query
        let mut query = String::from("UPDATE users SET ");
        let mut params: Vec<String> = Vec::new();
        let mut param_idx = 1;

        if input.username.is_some() {
            params.push(format!("username = ${param_idx}"));
            param_idx += 1;
        }
        if input.mail.is_some() {
            params.push(format!("mail = ${param_idx}"));
            param_idx += 1;
        }
        if input.is_admin.is_some() {
            params.push(format!("is_admin = ${param_idx}"));
            param_idx += 1;
        }
        if input.status.is_some() {
            params.push(format!("status = ${param_idx}"));
            param_idx += 1;
        }

        if params.is_empty() {
            // Nothing to update, just return the user
            return Self::find_by_id(pool, id).await;
        }

        query.push_str(&params.join(", "));
        query.push_str(&format!(" WHERE id = ${param_idx} RETURNING *"));

        let mut query_builder = sqlx::query_as::<_, User>(&query);

        if let Some(ref username) = input.username {
            query_builder = query_builder.bind(username);
        }
        if let Some(ref mail) = input.mail {
            query_builder = query_builder.bind(mail);
        }
        if let Some(is_admin) = input.is_admin {
            query_builder = query_builder.bind(is_admin);
        }
        if let Some(status) = input.status {
            query_builder = query_builder.bind(status);
        }
        query_builder = query_builder.bind(id);

        let user = query_builder
            .fetch_optional(pool)
            .await
            .context("failed to update user")?;

        Ok(user)
    }

    /// Replace the user's own grant keys.
    pub async fn set_menu_permissions(pool: &PgPool, id: Uuid, keys: &[String]) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET menu_permissions = $1 WHERE id = $2")
            .bind(Json(keys))
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update menu permissions")?;

        Ok(result.rows_affected() > 0)
    }

    /// Assign a role to the user, or clear it with `None`.
    pub async fn assign_role(pool: &PgPool, id: Uuid, role_id: Option<Uuid>) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role_id = $1 WHERE id = $2")
            .bind(role_id)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to assign role")?;

        Ok(result.rows_affected() > 0)
    }

    /// Update the user's password.
    pub async fn update_password(pool: &PgPool, id: Uuid, new_password: &str) -> Result<bool> {
        let pass = hash_password(new_password)?;

        let result = sqlx::query("UPDATE users SET pass = $1 WHERE id = $2")
            .bind(&pass)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update password")?;

        Ok(result.rows_affected() > 0)
    }

    /// Update the user's last login time.
    pub async fn touch_login(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET login = NOW(), access = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update login time")?;

        Ok(())
    }

    /// List all users.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
            .fetch_all(pool)
            .await
            .context("failed to list users")?;

        Ok(users)
    }

    /// Count all users.
    pub async fn count(pool: &PgPool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .context("failed to count users")?;

        Ok(count)
    }

    /// Delete a user.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }

    /// Verify a password against this user's hash.
    pub fn verify_password(&self, password: &str) -> bool {
        if self.pass.is_empty() {
            return false;
        }

        let Ok(parsed_hash) = PasswordHash::new(&self.pass) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        // Hash should start with Argon2 identifier
        assert!(hash.starts_with("$argon2"));

        // Verify should work
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        );

        // Wrong password should fail
        assert!(
            Argon2::default()
                .verify_password(b"wrong_password", &parsed)
                .is_err()
        );
    }

    #[test]
    fn test_verify_password_rejects_bad_hashes() {
        let mut user = User {
            id: Uuid::now_v7(),
            username: "till1".to_string(),
            pass: String::new(),
            mail: "till1@example.com".to_string(),
            is_admin: false,
            role_id: None,
            menu_permissions: Json(vec![]),
            status: 1,
            created: Utc::now(),
            login: None,
            access: None,
        };

        // Empty and malformed stored hashes never verify.
        assert!(!user.verify_password("anything"));
        user.pass = "not-a-phc-string".to_string();
        assert!(!user.verify_password("anything"));
    }
}
