//! HTTP route handlers.

pub mod admin_user;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod helpers;
pub mod metrics;
pub mod sections;
pub mod settings;
