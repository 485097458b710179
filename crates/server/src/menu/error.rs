//! Menu catalog error types with clear, actionable messages.
//!
//! All errors name the offending item so a bad catalog file can be fixed
//! without reading server source.

use thiserror::Error;

/// Errors raised while reading, parsing, or validating a catalog definition.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// An item was defined without a key.
    #[error("menu item '{label}' has an empty key")]
    EmptyKey { label: String },

    /// An item's route does not begin with '/'.
    #[error("menu item '{key}': route '{route}' must start with '/'")]
    RouteNotRooted { key: String, route: String },

    /// Two items share the same key.
    #[error("duplicate menu key '{key}'")]
    DuplicateKey { key: String },

    /// The definition is not valid TOML.
    #[error("failed to parse menu catalog: {0}")]
    Parse(#[from] toml::de::Error),

    /// The catalog file could not be read.
    #[error("failed to read menu file '{path}': {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
