//! Template engine backed by Tera.

use std::path::Path;

use anyhow::{Context, Result};
use tera::Tera;
use tracing::debug;

/// Template engine for rendering pages.
pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Create a new engine loading templates from the given directory.
    pub fn new(template_dir: &Path) -> Result<Self> {
        let pattern = template_dir.join("**/*.html");
        let pattern_str = pattern
            .to_str()
            .context("invalid template directory path")?;

        let mut tera = Tera::new(pattern_str).context("failed to initialize Tera templates")?;
        Self::register_filters(&mut tera);

        let template_names: Vec<_> = tera.get_template_names().collect();
        debug!(count = template_names.len(), "loaded templates");

        Ok(Self { tera })
    }

    /// Render a template with the given context.
    pub fn render(&self, template: &str, context: &tera::Context) -> Result<String> {
        self.tera
            .render(template, context)
            .with_context(|| format!("failed to render template {template}"))
    }

    /// Register custom Tera filters.
    fn register_filters(tera: &mut Tera) {
        // Filter for formatting RFC 3339 timestamps as short dates
        tera.register_filter(
            "format_date",
            |value: &tera::Value, _args: &std::collections::HashMap<String, tera::Value>| {
                let raw = match value {
                    tera::Value::String(s) => s.as_str(),
                    _ => return Ok(tera::Value::String(String::new())),
                };

                let formatted = chrono::DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.format("%b %-d, %Y %H:%M").to_string())
                    .unwrap_or_else(|_| raw.to_string());

                Ok(tera::Value::String(formatted))
            },
        );
    }
}
