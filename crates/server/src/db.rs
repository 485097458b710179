//! Database connection pool management.

use anyhow::{Context, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::config::Config;
use crate::menu::MenuCatalog;
use crate::models::User;
use crate::models::user::CreateUser;
use crate::permissions::initial_permissions;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Run pending database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    Ok(())
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Create the bootstrap admin account when the users table is empty.
///
/// Idempotent: runs at every startup and does nothing once any account
/// exists.
pub async fn bootstrap_admin(pool: &PgPool, config: &Config, catalog: &MenuCatalog) -> Result<()> {
    let count = User::count(pool).await?;
    if count > 0 {
        return Ok(());
    }

    let password = match config.admin_password.as_deref() {
        Some(password) => password.to_string(),
        None => {
            let generated: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(24)
                .map(char::from)
                .collect();
            warn!(
                password = %generated,
                "ADMIN_PASSWORD not set; generated an initial admin password, change it after first sign-in"
            );
            generated
        }
    };

    let admin = User::create(
        pool,
        CreateUser {
            username: "admin".to_string(),
            password,
            mail: "admin@localhost".to_string(),
            is_admin: true,
            role_id: None,
            menu_permissions: initial_permissions(true, catalog),
        },
    )
    .await
    .context("failed to create bootstrap admin")?;

    info!(user_id = %admin.id, "created bootstrap admin account");

    Ok(())
}
