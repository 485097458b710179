//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Redis connection URL.
    pub redis_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Optional TOML file overriding the compiled-in menu catalog.
    pub menu_file: Option<PathBuf>,

    /// Path to templates directory (default: ./templates).
    pub templates_dir: PathBuf,

    /// Password for the bootstrap admin account, created when the users
    /// table is empty. When None, a password is generated and logged once.
    pub admin_password: Option<String>,

    /// Cookie SameSite policy: "strict", "lax", or "none" (default: "strict").
    pub cookie_same_site: String,

    /// Store display name shown in page titles (default: "Tillpoint").
    pub site_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let menu_file = env::var("MENU_FILE").map(PathBuf::from).ok();

        let templates_dir = env::var("TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./templates"));

        let admin_password = env::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty());

        let cookie_same_site = env::var("COOKIE_SAME_SITE")
            .unwrap_or_else(|_| "strict".to_string())
            .to_lowercase();

        let site_name = env::var("SITE_NAME").unwrap_or_else(|_| "Tillpoint".to_string());

        Ok(Self {
            port,
            database_url,
            redis_url,
            database_max_connections,
            menu_file,
            templates_dir,
            admin_password,
            cookie_same_site,
            site_name,
        })
    }
}
