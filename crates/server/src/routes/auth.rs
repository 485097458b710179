//! Authentication routes (login, logout).

use axum::Router;
use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Form;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;
use uuid::Uuid;

use crate::csrf::{generate_csrf_token, verify_csrf_token};
use crate::models::User;
use crate::routes::helpers::take_flash;
use crate::state::AppState;

/// Session key for storing the authenticated user ID.
pub const SESSION_USER_ID: &str = "user_id";

/// Login form body.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(rename = "_token")]
    pub csrf_token: Option<String>,
}

/// Typed login error for explicit message mapping.
///
/// Avoids brittle substring matching on error strings by encoding
/// the error category in the enum variant.
#[derive(Debug)]
enum LoginError {
    /// Account temporarily locked due to too many failed attempts.
    Locked(String),
    /// Invalid credentials, wrong username or password.
    InvalidCredentials,
    /// Internal server error, database failure, etc.
    Internal,
}

impl LoginError {
    fn message(&self) -> &str {
        match self {
            LoginError::Locked(msg) => msg,
            LoginError::InvalidCredentials => "Invalid username or password",
            LoginError::Internal => "Internal server error",
        }
    }
}

/// Where a fresh login lands: the catalog's fallback route when one exists.
fn landing_route(state: &AppState) -> String {
    state
        .catalog()
        .fallback()
        .map(|item| item.route.clone())
        .unwrap_or_else(|| "/".to_string())
}

/// Login form handler.
///
/// GET /user/login
/// - Renders login form with CSRF token
async fn login_form(State(state): State<AppState>, session: Session) -> Response {
    // Already signed in: skip the form
    let user_id: Option<Uuid> = session.get(SESSION_USER_ID).await.ok().flatten();
    if user_id.is_some() {
        return Redirect::to(&landing_route(&state)).into_response();
    }

    let csrf_token = match generate_csrf_token(&session).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "failed to generate CSRF token");
            return Html("<h1>Error</h1><p>Failed to generate form token</p>".to_string())
                .into_response();
        }
    };

    let mut context = tera::Context::new();
    context.insert("site_name", state.site_name());
    context.insert("csrf_token", &csrf_token);
    if let Some(flash) = take_flash(&session).await {
        context.insert("flash", &flash);
    }

    render_login(&state, context)
}

/// Form-based login handler.
///
/// POST /user/login (form data)
async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    // A missing token is as invalid as a wrong one
    let token_ok = match &form.csrf_token {
        Some(token) => verify_csrf_token(&session, token).await.unwrap_or(false),
        None => false,
    };
    if !token_ok {
        return render_login_error(&state, &session, "Invalid form token. Please try again.").await;
    }

    match do_login(&state, &session, &form.username, &form.password).await {
        Ok(()) => {
            state.metrics().record_login_success();
            Redirect::to(&landing_route(&state)).into_response()
        }
        Err(e) => {
            state.metrics().record_login_failure();
            render_login_error(&state, &session, e.message()).await
        }
    }
}

/// Render login form with error message and a fresh token.
async fn render_login_error(state: &AppState, session: &Session, error: &str) -> Response {
    let csrf_token = generate_csrf_token(session).await.unwrap_or_default();

    let mut context = tera::Context::new();
    context.insert("site_name", state.site_name());
    context.insert("csrf_token", &csrf_token);
    context.insert("error", error);

    render_login(state, context)
}

fn render_login(state: &AppState, context: tera::Context) -> Response {
    match state.theme().render("login.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render login form");
            let csrf_token = context
                .get("csrf_token")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Html(format!(
                r#"<!DOCTYPE html>
<html><head><title>Sign in</title></head>
<body style="font-family: sans-serif; max-width: 400px; margin: 100px auto; padding: 2rem;">
<h1>Sign in</h1>
<form method="post" action="/user/login">
<input type="hidden" name="_token" value="{csrf_token}">
<p><label>Username<br><input type="text" name="username" required></label></p>
<p><label>Password<br><input type="password" name="password" required></label></p>
<p><button type="submit">Sign in</button></p>
</form>
</body></html>"#
            ))
            .into_response()
        }
    }
}

/// Perform login and return typed error on failure.
async fn do_login(
    state: &AppState,
    session: &Session,
    username: &str,
    password: &str,
) -> Result<(), LoginError> {
    // Check if account is locked
    match state.lockout().locked_for(username).await {
        Ok(Some(secs)) => {
            return Err(LoginError::Locked(format!(
                "Account temporarily locked. Try again in {} minutes.",
                (secs / 60) + 1
            )));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "failed to check lockout status");
        }
    }

    // Find user by username
    let user = match User::find_by_username(state.db(), username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            let _ = state.lockout().record_failed_attempt(username).await;
            return Err(LoginError::InvalidCredentials);
        }
        Err(e) => {
            tracing::error!(error = %e, "database error during login");
            return Err(LoginError::Internal);
        }
    };

    // Blocked accounts fail exactly like bad passwords
    if !user.is_active() {
        let _ = state.lockout().record_failed_attempt(username).await;
        return Err(LoginError::InvalidCredentials);
    }

    // Verify password
    if !user.verify_password(password) {
        match state.lockout().record_failed_attempt(username).await {
            Ok((locked, _)) => {
                if locked {
                    return Err(LoginError::Locked(
                        "Account temporarily locked due to too many failed attempts.".to_string(),
                    ));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to record failed attempt");
            }
        }
        return Err(LoginError::InvalidCredentials);
    }

    // Successful login - clear any failed attempts
    let _ = state.lockout().clear_attempts(username).await;

    // Update login timestamp
    if let Err(e) = User::touch_login(state.db(), user.id).await {
        tracing::warn!(error = %e, user_id = %user.id, "failed to update login timestamp");
    }

    session
        .insert(SESSION_USER_ID, user.id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to insert user_id into session");
            LoginError::Internal
        })?;

    info!(user_id = %user.id, "user logged in");
    Ok(())
}

/// Logout handler.
///
/// GET /user/logout
/// - Deletes session from Redis
/// - Clears session cookie
async fn logout(session: Session) -> Response {
    if let Err(e) = session.delete().await {
        tracing::error!(error = %e, "failed to delete session");
    }

    Redirect::to("/user/login").into_response()
}

/// Create the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/login", get(login_form).post(login_submit))
        .route("/user/logout", get(logout))
}
