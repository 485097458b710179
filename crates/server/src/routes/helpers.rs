//! Shared route helpers for page rendering.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::authz::{ACCESS_DENIED_MESSAGE, Role};
use crate::csrf::verify_csrf_token;
use crate::menu::MenuCatalog;
use crate::models::User;
use crate::routes::auth::SESSION_USER_ID;
use crate::state::AppState;

/// Session key for the one-shot flash message.
pub const FLASH_KEY: &str = "flash";

/// Checkbox field prefix used by the permission editors.
pub const PERMISSION_FIELD_PREFIX: &str = "perm_";

/// Require an authenticated active user, or redirect to login.
///
/// Returns the [`User`] if one is logged in. Returns a redirect response if
/// the session contains no valid user id.
pub async fn require_login(state: &AppState, session: &Session) -> Result<User, Response> {
    let user_id: Option<Uuid> = session.get(SESSION_USER_ID).await.ok().flatten();

    if let Some(id) = user_id {
        if let Ok(Some(user)) = User::find_by_id(state.db(), id).await {
            if user.is_active() {
                return Ok(user);
            }
        }
    }

    Err(Redirect::to("/user/login").into_response())
}

/// Require an authenticated **admin** user, or redirect/reject.
///
/// Returns the admin [`User`] on success. Redirects to `/user/login` if the
/// session has no valid user. Returns 403 if the user exists but is not an
/// admin.
pub async fn require_admin(state: &AppState, session: &Session) -> Result<User, Response> {
    let user = require_login(state, session).await?;

    if user.is_admin {
        return Ok(user);
    }

    Err((StatusCode::FORBIDDEN, Html(ACCESS_DENIED_MESSAGE.to_string())).into_response())
}

/// Read and clear the flash message for this session.
pub async fn take_flash(session: &Session) -> Option<String> {
    session.remove(FLASH_KEY).await.ok().flatten()
}

/// Form body for POST actions that carry nothing but a CSRF token.
#[derive(Debug, Deserialize)]
pub struct CsrfOnlyForm {
    #[serde(rename = "_token")]
    pub token: String,
}

/// Verify a submitted CSRF token, or produce the error response to return.
pub async fn require_csrf(session: &Session, token: &str) -> Result<(), Response> {
    match verify_csrf_token(session, token).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(render_error(
            "Invalid form token. Please go back and try again.",
        )),
        Err(e) => {
            tracing::error!(error = %e, "CSRF verification failed");
            Err(render_error(
                "Invalid form token. Please go back and try again.",
            ))
        }
    }
}

/// Collect the menu keys ticked in a permission editor form.
///
/// Checkboxes are named `perm_<key>`; unchecked boxes are simply absent from
/// the body. The result is sanitized against the catalog, so unknown and
/// admin-only keys never survive.
pub fn selected_grants(catalog: &MenuCatalog, fields: &HashMap<String, String>) -> Vec<String> {
    let requested = catalog
        .all_keys()
        .iter()
        .filter(|key| fields.contains_key(&format!("{PERMISSION_FIELD_PREFIX}{key}")));

    catalog.sanitize_grants(requested)
}

/// Build the base template context for a signed-in page.
///
/// Adds: `site_name`, `username`, `is_admin`, `sidebar`, and `flash` (when
/// one is pending; reading it clears it).
pub async fn page_context(state: &AppState, session: &Session, user: &User) -> tera::Context {
    let mut context = tera::Context::new();
    context.insert("site_name", state.site_name());
    context.insert("username", &user.username);
    context.insert("is_admin", &user.is_admin);

    let role = match state.permissions().resolve_role(user).await {
        Ok(role) => role,
        Err(e) => {
            tracing::warn!(error = %e, user_id = %user.id, "failed to resolve role for sidebar");
            Role::Standard(Default::default())
        }
    };
    context.insert("sidebar", &state.catalog().sidebar_for(&role));

    if let Some(flash) = take_flash(session).await {
        context.insert("flash", &flash);
    }

    context
}

/// Render a template, falling back to a plain error page.
pub fn render_template(state: &AppState, template: &str, context: &tera::Context) -> Response {
    match state.theme().render(template, context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, template = %template, "failed to render template");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    r#"<!DOCTYPE html>
<html><head><title>Error</title></head>
<body><h1>Template Error</h1><pre>{}</pre></body></html>"#,
                    html_escape(&e.to_string())
                )),
            )
                .into_response()
        }
    }
}

/// Render an error page.
pub fn render_error(message: &str) -> Response {
    let html = format!(
        r#"<!DOCTYPE html>
<html><head><title>Error</title></head>
<body>
<div style="max-width: 600px; margin: 100px auto; text-align: center;">
<h1>Error</h1>
<p>{}</p>
<p><a href="javascript:history.back()">Go back</a></p>
</div>
</body></html>"#,
        html_escape(message)
    );

    (StatusCode::BAD_REQUEST, Html(html)).into_response()
}

/// Render a 500 page.
pub fn render_server_error(message: &str) -> Response {
    let html = format!(
        r#"<!DOCTYPE html>
<html><head><title>Server Error</title></head>
<body>
<div style="max-width: 600px; margin: 100px auto; text-align: center;">
<h1>Server Error</h1>
<p>{}</p>
<p><a href="/dashboard">Return to dashboard</a></p>
</div>
</body></html>"#,
        html_escape(message)
    );

    (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
}

/// Render a 404 page.
pub fn render_not_found() -> Response {
    let html = r#"<!DOCTYPE html>
<html><head><title>Not Found</title></head>
<body>
<div style="max-width: 600px; margin: 100px auto; text-align: center;">
<h1>Not Found</h1>
<p>The requested page could not be found.</p>
<p><a href="/dashboard">Return to dashboard</a></p>
</div>
</body></html>"#;

    (StatusCode::NOT_FOUND, Html(html)).into_response()
}

/// HTML-escape a string for safe output.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_grants_filters_and_orders() {
        let catalog = MenuCatalog::builtin().unwrap();
        let mut fields = HashMap::new();
        // Checkboxes arrive in arbitrary order, mixed with other fields.
        fields.insert("perm_pos".to_string(), "on".to_string());
        fields.insert("perm_dashboard".to_string(), "on".to_string());
        fields.insert("perm_users".to_string(), "on".to_string());
        fields.insert("username".to_string(), "casey".to_string());

        // Admin-only "users" is dropped; order follows the catalog.
        assert_eq!(selected_grants(&catalog, &fields), vec!["dashboard", "pos"]);
    }

    #[test]
    fn test_selected_grants_empty_form() {
        let catalog = MenuCatalog::builtin().unwrap();
        assert!(selected_grants(&catalog, &HashMap::new()).is_empty());
    }

    #[test]
    fn test_html_escape_special_chars() {
        assert_eq!(
            html_escape("<script>alert('xss')</script>"),
            "&lt;script&gt;alert(&#x27;xss&#x27;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_html_escape_ampersand() {
        assert_eq!(html_escape("a & b"), "a &amp; b");
    }

    #[test]
    fn test_html_escape_plain_text() {
        assert_eq!(html_escape("hello world"), "hello world");
    }
}
