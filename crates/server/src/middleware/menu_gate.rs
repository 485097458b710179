//! Menu authorization middleware.
//!
//! Runs on every request after the session layer: maps the request path to
//! its menu item, resolves the subject from the session, asks the gate, and
//! translates the decision into a response. Paths under no registered route
//! (login, health, metrics, static assets) pass through untouched.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{error, warn};
use uuid::Uuid;

use crate::authz::{Decision, Subject};
use crate::models::User;
use crate::routes::auth::SESSION_USER_ID;
use crate::routes::helpers::FLASH_KEY;
use crate::state::AppState;

/// Middleware enforcing menu-based authorization.
pub async fn enforce_menu_access(
    State(state): State<AppState>,
    session: Session,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    // Only registered sections are gated
    let Some(item) = state.catalog().match_route(path) else {
        return next.run(request).await;
    };
    let menu_key = item.key.clone();
    let on_fallback_route = item.fallback_safe;

    let subject = match resolve_subject(&state, &session).await {
        Ok(subject) => subject,
        Err(e) => {
            error!(error = %e, path = %path, "failed to resolve subject");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    let decision = state
        .gate()
        .evaluate(subject.as_ref(), &menu_key, on_fallback_route);
    state.metrics().record_decision(&menu_key, &decision);

    match decision {
        // Handlers still authenticate; an anonymous request to a protected
        // section lands on the login redirect inside the handler.
        Decision::Allow | Decision::PassUnauthenticated => next.run(request).await,
        Decision::DenyRedirect { target, message } => {
            if let Err(e) = session.insert(FLASH_KEY, message).await {
                warn!(error = %e, "failed to store flash message");
            }
            Redirect::to(&target).into_response()
        }
        Decision::DenyForbidden { message } => {
            (StatusCode::FORBIDDEN, message).into_response()
        }
    }
}

/// Build the gate's subject from the session, or None when nobody is
/// signed in.
///
/// A session naming a deleted or blocked account is discarded rather than
/// treated as anonymous-with-history.
async fn resolve_subject(state: &AppState, session: &Session) -> anyhow::Result<Option<Subject>> {
    let user_id: Option<Uuid> = session
        .get(SESSION_USER_ID)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read session: {e}"))?;

    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let Some(user) = User::find_by_id(state.db(), user_id).await? else {
        warn!(user_id = %user_id, "session references missing user; clearing");
        let _ = session.delete().await;
        return Ok(None);
    };

    if !user.is_active() {
        warn!(user_id = %user_id, "session references blocked user; clearing");
        let _ = session.delete().await;
        return Ok(None);
    }

    let subject = state.permissions().subject_for(&user).await?;
    Ok(Some(subject))
}
