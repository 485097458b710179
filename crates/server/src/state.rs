//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::info;

use crate::authz::MenuGate;
use crate::config::Config;
use crate::db;
use crate::lockout::LockoutService;
use crate::menu::MenuCatalog;
use crate::metrics::Metrics;
use crate::permissions::PermissionService;
use crate::theme::ThemeEngine;

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Redis client for lockout tracking.
    redis: RedisClient,

    /// Menu catalog, immutable for the process lifetime.
    catalog: Arc<MenuCatalog>,

    /// Authorization gate over the catalog.
    gate: MenuGate,

    /// Grant resolution service.
    permissions: PermissionService,

    /// Account lockout service.
    lockout: LockoutService,

    /// Theme engine for template rendering.
    theme: Arc<ThemeEngine>,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,

    /// Store display name for page titles.
    site_name: String,
}

impl AppState {
    /// Create new application state with database connections.
    pub async fn new(config: &Config) -> Result<Self> {
        // Create PostgreSQL pool
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        // Run migrations
        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;

        // Load the menu catalog; everything downstream shares this Arc
        let catalog = Arc::new(
            MenuCatalog::load(config.menu_file.as_deref())
                .context("failed to load menu catalog")?,
        );
        info!(
            items = catalog.len(),
            fallback = catalog.fallback().map(|item| item.key.as_str()),
            "loaded menu catalog"
        );

        // Seed the first admin account on an empty install
        db::bootstrap_admin(&db, config, &catalog)
            .await
            .context("failed to bootstrap admin account")?;

        // Create Redis client
        let redis = RedisClient::open(config.redis_url.as_str())
            .context("failed to create Redis client")?;

        // Test Redis connection
        let mut conn = redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to Redis")?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;

        let gate = MenuGate::new(catalog.clone());

        // Create permission service
        let permissions = PermissionService::new(db.clone());

        // Create lockout service
        let lockout = LockoutService::new(redis.clone());

        // Create theme engine
        let theme = Arc::new(
            ThemeEngine::new(&config.templates_dir).context("failed to create theme engine")?,
        );

        // Create metrics
        let metrics = Arc::new(Metrics::new());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                db,
                redis,
                catalog,
                gate,
                permissions,
                lockout,
                theme,
                metrics,
                site_name: config.site_name.clone(),
            }),
        })
    }

    /// Get the database pool.
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    /// Get the Redis client.
    pub fn redis(&self) -> &RedisClient {
        &self.inner.redis
    }

    /// Get the menu catalog.
    pub fn catalog(&self) -> &Arc<MenuCatalog> {
        &self.inner.catalog
    }

    /// Get the authorization gate.
    pub fn gate(&self) -> &MenuGate {
        &self.inner.gate
    }

    /// Get the permission service.
    pub fn permissions(&self) -> &PermissionService {
        &self.inner.permissions
    }

    /// Get the lockout service.
    pub fn lockout(&self) -> &LockoutService {
        &self.inner.lockout
    }

    /// Get the theme engine.
    pub fn theme(&self) -> &Arc<ThemeEngine> {
        &self.inner.theme
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Get the store display name.
    pub fn site_name(&self) -> &str {
        &self.inner.site_name
    }

    /// Check if PostgreSQL is healthy.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }

    /// Check if Redis is healthy.
    pub async fn redis_healthy(&self) -> bool {
        let Ok(mut conn) = self.inner.redis.get_multiplexed_async_connection().await else {
            return false;
        };

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
