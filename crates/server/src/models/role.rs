//! Role model: named, reusable grant sets.
//!
//! A role bundles menu keys so staff accounts can share one assignment
//! instead of hand-picked per-user grants. The authorization role
//! (admin/standard) is the `users.is_admin` column, not this table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Role record.
///
/// `is_system` marks the seeded roles; they can be edited but never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub permissions: Json<Vec<String>>,
    pub is_system: bool,
    pub created: DateTime<Utc>,
}

impl Role {
    /// The role's grant keys.
    pub fn grant_keys(&self) -> &[String] {
        &self.permissions.0
    }

    /// Find a role by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch role by id")?;

        Ok(role)
    }

    /// Find a role by name.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("failed to fetch role by name")?;

        Ok(role)
    }

    /// List all roles.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(pool)
            .await
            .context("failed to list roles")?;

        Ok(roles)
    }

    /// Create a new role. `permissions` must already be sanitized against
    /// the catalog.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        display_name: &str,
        permissions: &[String],
    ) -> Result<Self> {
        let id = Uuid::now_v7();

        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (id, name, display_name, permissions) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(display_name)
        .bind(Json(permissions))
        .fetch_one(pool)
        .await
        .context("failed to create role")?;

        Ok(role)
    }

    /// Update a role's name, label, and grant set. `is_system` is never
    /// writable through this path.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        name: &str,
        display_name: &str,
        permissions: &[String],
    ) -> Result<Option<Self>> {
        let role = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = $1, display_name = $2, permissions = $3 WHERE id = $4 RETURNING *",
        )
        .bind(name)
        .bind(display_name)
        .bind(Json(permissions))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to update role")?;

        Ok(role)
    }

    /// Delete a role. Users assigned to it fall back to their own grants.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        // Prevent deletion of seeded roles
        let is_system: Option<bool> = sqlx::query_scalar("SELECT is_system FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to check role protection")?;

        if is_system == Some(true) {
            anyhow::bail!("cannot delete built-in role");
        }

        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete role")?;

        Ok(result.rows_affected() > 0)
    }

    /// Count users currently assigned to a role.
    pub async fn assigned_users(pool: &PgPool, id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .context("failed to count role assignments")?;

        Ok(count)
    }
}
