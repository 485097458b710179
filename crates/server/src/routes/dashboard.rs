//! Dashboard: the landing page after sign-in.
//!
//! Deny redirects land here too, surfacing their flash message above the
//! fold.

use axum::Router;
use axum::extract::State;
use axum::response::{Redirect, Response};
use axum::routing::get;
use tower_sessions::Session;

use crate::routes::helpers::{page_context, render_template, require_login};
use crate::state::AppState;

/// GET / - the root just forwards to the dashboard.
async fn root() -> Redirect {
    Redirect::to("/dashboard")
}

/// GET /dashboard
async fn dashboard(State(state): State<AppState>, session: Session) -> Response {
    let user = match require_login(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let mut context = page_context(&state, &session, &user).await;
    context.insert("last_login", &user.login);
    context.insert("path", "/dashboard");

    render_template(&state, "dashboard.html", &context)
}

/// Create the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/dashboard", get(dashboard))
}
