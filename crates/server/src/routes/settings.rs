//! Site settings screen: a read-only view of the registered menu catalog.
//!
//! The catalog is immutable for the life of the process; changes ship as an
//! updated menu file and a restart. This screen shows operators what is
//! currently registered and where denied requests land.

use axum::Router;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use tower_sessions::Session;

use crate::routes::helpers::{page_context, render_template, require_admin};
use crate::state::AppState;

/// GET /admin/settings
async fn settings(State(state): State<AppState>, session: Session) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("menu_items", &state.catalog().items_ordered());
    context.insert("groups", &state.catalog().groups());
    context.insert("defaults", &state.catalog().default_permissions());
    context.insert("fallback", &state.catalog().fallback());
    context.insert("path", "/admin/settings");

    render_template(&state, "admin/settings.html", &context)
}

/// Create the settings router.
pub fn router() -> Router<AppState> {
    Router::new().route("/admin/settings", get(settings))
}
