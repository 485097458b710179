//! Tillpoint POS Server Library
//!
//! This library exposes server internals for integration testing.
//! The main entry point for running the server is the `tillpoint` binary.

pub mod authz;
pub mod config;
pub mod csrf;
pub mod db;
pub mod lockout;
pub mod menu;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod routes;
pub mod session;
pub mod state;
pub mod theme;
