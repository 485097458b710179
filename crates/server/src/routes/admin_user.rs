//! Admin routes for user and role management.
//!
//! This is where grant sets get written. Every write path runs submitted
//! keys through the catalog sanitizer and drops the permission cache entry
//! for the affected user, so the gate never evaluates stale grants.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::csrf::generate_csrf_token;
use crate::models::{CreateUser, Role, UpdateUser, User};
use crate::permissions::initial_permissions;
use crate::state::AppState;

use super::helpers::{
    CsrfOnlyForm, page_context, render_error, render_not_found, render_server_error,
    render_template, require_admin, require_csrf, selected_grants,
};

/// User form data.
///
/// Permission checkboxes arrive as `perm_<key>` fields and land in the
/// flattened map; unchecked boxes are absent.
#[derive(Debug, Deserialize)]
struct UserFormData {
    #[serde(rename = "_token")]
    token: String,
    #[serde(rename = "_form_build_id")]
    form_build_id: String,
    username: String,
    mail: String,
    password: Option<String>,
    is_admin: Option<String>,
    status: Option<String>,
    role: Option<String>,
    #[serde(flatten)]
    grants: std::collections::HashMap<String, String>,
}

/// Role form data.
#[derive(Debug, Deserialize)]
struct RoleFormData {
    #[serde(rename = "_token")]
    token: String,
    #[serde(rename = "_form_build_id")]
    form_build_id: String,
    name: String,
    display_name: String,
    #[serde(flatten)]
    grants: std::collections::HashMap<String, String>,
}

/// Resolve the role select value to a role id, validating it exists.
///
/// An empty selection means "no assigned role": the user runs on their own
/// grants alone.
async fn resolve_role_choice(
    state: &AppState,
    raw: Option<&str>,
    errors: &mut Vec<String>,
) -> Option<Uuid> {
    let raw = raw.filter(|value| !value.is_empty())?;

    let Ok(role_id) = raw.parse::<Uuid>() else {
        errors.push("Invalid role selection.".to_string());
        return None;
    };

    match Role::find_by_id(state.db(), role_id).await {
        Ok(Some(_)) => Some(role_id),
        Ok(None) => {
            errors.push("The selected role no longer exists.".to_string());
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to look up role");
            errors.push("The selected role could not be verified.".to_string());
            None
        }
    }
}

/// Labels of the sections every new standard account starts with.
fn default_grant_labels(state: &AppState) -> Vec<String> {
    state
        .catalog()
        .default_permissions()
        .iter()
        .filter_map(|key| state.catalog().lookup(key))
        .map(|item| item.label.clone())
        .collect()
}

// =============================================================================
// User Management
// =============================================================================

/// List all users.
///
/// GET /admin/people
async fn list_users(State(state): State<AppState>, session: Session) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let users = match User::list(state.db()).await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(error = %e, "failed to list users");
            return render_server_error("Failed to load users.");
        }
    };

    let roles = Role::list(state.db()).await.unwrap_or_default();
    let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("users", &users);
    context.insert("roles", &roles);
    context.insert("csrf_token", &csrf_token);
    context.insert("path", "/admin/people");

    render_template(&state, "admin/users.html", &context)
}

/// Show add user form.
///
/// GET /admin/people/add
async fn add_user_form(State(state): State<AppState>, session: Session) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let roles = Role::list(state.db()).await.unwrap_or_default();
    let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
    let form_build_id = Uuid::new_v4().to_string();

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("action", "/admin/people/add");
    context.insert("csrf_token", &csrf_token);
    context.insert("form_build_id", &form_build_id);
    context.insert("editing", &false);
    context.insert("values", &serde_json::json!({}));
    context.insert("roles", &roles);
    context.insert("default_labels", &default_grant_labels(&state));
    context.insert("path", "/admin/people/add");

    render_template(&state, "admin/user-form.html", &context)
}

/// Handle add user form submission.
///
/// POST /admin/people/add
async fn add_user_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UserFormData>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    // Verify CSRF token
    if let Err(resp) = require_csrf(&session, &form.token).await {
        return resp;
    }

    // Validate
    let mut errors = Vec::new();

    if form.username.trim().is_empty() {
        errors.push("Username is required.".to_string());
    }

    if form.mail.trim().is_empty() {
        errors.push("Email is required.".to_string());
    }

    let password = form.password.as_deref().unwrap_or("");
    if password.is_empty() {
        errors.push("Password is required.".to_string());
    } else if password.len() < 8 {
        errors.push("Password must be at least 8 characters.".to_string());
    }

    // Check if username already exists
    if let Ok(Some(_)) = User::find_by_username(state.db(), &form.username).await {
        errors.push(format!("Username '{}' is already taken.", form.username));
    }

    // Check if email already exists
    if let Ok(Some(_)) = User::find_by_mail(state.db(), &form.mail).await {
        errors.push(format!("Email '{}' is already in use.", form.mail));
    }

    let role_id = resolve_role_choice(&state, form.role.as_deref(), &mut errors).await;

    if !errors.is_empty() {
        let roles = Role::list(state.db()).await.unwrap_or_default();
        let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
        let form_build_id = Uuid::new_v4().to_string();

        let mut context = page_context(&state, &session, &current_user).await;
        context.insert("action", "/admin/people/add");
        context.insert("csrf_token", &csrf_token);
        context.insert("form_build_id", &form_build_id);
        context.insert("editing", &false);
        context.insert("errors", &errors);
        context.insert(
            "values",
            &serde_json::json!({
                "username": form.username,
                "mail": form.mail,
                "is_admin": form.is_admin.is_some(),
                "status": form.status.is_some(),
                "role": form.role.clone().unwrap_or_default(),
            }),
        );
        context.insert("roles", &roles);
        context.insert("default_labels", &default_grant_labels(&state));
        context.insert("path", "/admin/people/add");

        return render_template(&state, "admin/user-form.html", &context);
    }

    // New accounts start with the provisioning defaults; the edit screen
    // adjusts from there.
    let menu_permissions = initial_permissions(form.is_admin.is_some(), state.catalog());

    let input = CreateUser {
        username: form.username.clone(),
        password: password.to_string(),
        mail: form.mail.clone(),
        is_admin: form.is_admin.is_some(),
        role_id,
        menu_permissions,
    };

    match User::create(state.db(), input).await {
        Ok(user) => {
            tracing::info!(username = %form.username, user_id = %user.id, "user created");
            Redirect::to("/admin/people").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to create user");
            render_server_error("Failed to create user.")
        }
    }
}

/// Show edit user form.
///
/// GET /admin/people/{id}/edit
async fn edit_user_form(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let Some(user) = User::find_by_id(state.db(), user_id).await.ok().flatten() else {
        return render_not_found();
    };

    let roles = Role::list(state.db()).await.unwrap_or_default();
    let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
    let form_build_id = Uuid::new_v4().to_string();

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("action", &format!("/admin/people/{user_id}/edit"));
    context.insert("csrf_token", &csrf_token);
    context.insert("form_build_id", &form_build_id);
    context.insert("editing", &true);
    context.insert("user_id", &user_id.to_string());
    context.insert(
        "values",
        &serde_json::json!({
            "username": user.username,
            "mail": user.mail,
            "is_admin": user.is_admin,
            "status": user.status == 1,
            "role": user.role_id.map(|id| id.to_string()).unwrap_or_default(),
        }),
    );
    context.insert("roles", &roles);
    context.insert("menu_items", &state.catalog().items_ordered());
    context.insert("user_grants", &user.own_grants());
    context.insert("path", &format!("/admin/people/{user_id}/edit"));

    render_template(&state, "admin/user-form.html", &context)
}

/// Handle edit user form submission.
///
/// POST /admin/people/{id}/edit
async fn edit_user_submit(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
    Form(form): Form<UserFormData>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    // Verify CSRF token
    if let Err(resp) = require_csrf(&session, &form.token).await {
        return resp;
    }

    let Some(existing_user) = User::find_by_id(state.db(), user_id).await.ok().flatten() else {
        return render_not_found();
    };

    // Validate
    let mut errors = Vec::new();

    if form.username.trim().is_empty() {
        errors.push("Username is required.".to_string());
    }

    if form.mail.trim().is_empty() {
        errors.push("Email is required.".to_string());
    }

    // Check if new username is taken by someone else
    if form.username != existing_user.username
        && let Ok(Some(_)) = User::find_by_username(state.db(), &form.username).await
    {
        errors.push(format!("Username '{}' is already taken.", form.username));
    }

    // Check if new email is taken by someone else
    if form.mail != existing_user.mail
        && let Ok(Some(_)) = User::find_by_mail(state.db(), &form.mail).await
    {
        errors.push(format!("Email '{}' is already in use.", form.mail));
    }

    // Validate password if provided
    if let Some(ref password) = form.password
        && !password.is_empty()
        && password.len() < 8
    {
        errors.push("Password must be at least 8 characters.".to_string());
    }

    let role_id = resolve_role_choice(&state, form.role.as_deref(), &mut errors).await;
    let grants = selected_grants(state.catalog(), &form.grants);

    if !errors.is_empty() {
        let roles = Role::list(state.db()).await.unwrap_or_default();
        let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
        let form_build_id = Uuid::new_v4().to_string();

        let mut context = page_context(&state, &session, &current_user).await;
        context.insert("action", &format!("/admin/people/{user_id}/edit"));
        context.insert("csrf_token", &csrf_token);
        context.insert("form_build_id", &form_build_id);
        context.insert("editing", &true);
        context.insert("user_id", &user_id.to_string());
        context.insert("errors", &errors);
        context.insert(
            "values",
            &serde_json::json!({
                "username": form.username,
                "mail": form.mail,
                "is_admin": form.is_admin.is_some(),
                "status": form.status.is_some(),
                "role": form.role.clone().unwrap_or_default(),
            }),
        );
        context.insert("roles", &roles);
        context.insert("menu_items", &state.catalog().items_ordered());
        context.insert("user_grants", &grants);
        context.insert("path", &format!("/admin/people/{user_id}/edit"));

        return render_template(&state, "admin/user-form.html", &context);
    }

    // Update the user
    let input = UpdateUser {
        username: Some(form.username.clone()),
        mail: Some(form.mail.clone()),
        is_admin: Some(form.is_admin.is_some()),
        status: Some(if form.status.is_some() { 1 } else { 0 }),
    };

    if let Err(e) = User::update(state.db(), user_id, input).await {
        tracing::error!(error = %e, "failed to update user");
        return render_server_error("Failed to update user.");
    }

    if let Err(e) = User::set_menu_permissions(state.db(), user_id, &grants).await {
        tracing::error!(error = %e, "failed to update user permissions");
        return render_server_error("Failed to update permissions.");
    }

    if let Err(e) = User::assign_role(state.db(), user_id, role_id).await {
        tracing::error!(error = %e, "failed to assign role");
        return render_server_error("Failed to assign role.");
    }

    // Update password if provided
    if let Some(ref password) = form.password
        && !password.is_empty()
        && let Err(e) = User::update_password(state.db(), user_id, password).await
    {
        tracing::error!(error = %e, "failed to update user password");
        return render_server_error("Failed to update password.");
    }

    // The next request for this user re-resolves grants from the database.
    state.permissions().invalidate_user(user_id);

    tracing::info!(user_id = %user_id, "user updated");
    Redirect::to("/admin/people").into_response()
}

/// Delete a user.
///
/// POST /admin/people/{id}/delete
async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<Uuid>,
    Form(form): Form<CsrfOnlyForm>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    if let Err(resp) = require_csrf(&session, &form.token).await {
        return resp;
    }

    // Prevent deleting yourself
    if user_id == current_user.id {
        return render_error("Cannot delete your own account.");
    }

    match User::delete(state.db(), user_id).await {
        Ok(true) => {
            state.permissions().invalidate_user(user_id);
            tracing::info!(user_id = %user_id, "user deleted");
            Redirect::to("/admin/people").into_response()
        }
        Ok(false) => render_not_found(),
        Err(e) => {
            tracing::error!(error = %e, "failed to delete user");
            render_server_error("Failed to delete user.")
        }
    }
}

// =============================================================================
// Role Management
// =============================================================================

/// List all roles.
///
/// GET /admin/people/roles
async fn list_roles(State(state): State<AppState>, session: Session) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let roles = match Role::list(state.db()).await {
        Ok(roles) => roles,
        Err(e) => {
            tracing::error!(error = %e, "failed to list roles");
            return render_server_error("Failed to load roles.");
        }
    };

    // Assignment counts, keyed by role id for the template
    let mut assigned: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for role in &roles {
        let count = Role::assigned_users(state.db(), role.id)
            .await
            .unwrap_or_default();
        assigned.insert(role.id.to_string(), count);
    }

    let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("roles", &roles);
    context.insert("assigned", &assigned);
    context.insert("csrf_token", &csrf_token);
    context.insert("path", "/admin/people/roles");

    render_template(&state, "admin/roles.html", &context)
}

/// Show add role form.
///
/// GET /admin/people/roles/add
async fn add_role_form(State(state): State<AppState>, session: Session) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
    let form_build_id = Uuid::new_v4().to_string();

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("action", "/admin/people/roles/add");
    context.insert("csrf_token", &csrf_token);
    context.insert("form_build_id", &form_build_id);
    context.insert("editing", &false);
    context.insert("values", &serde_json::json!({}));
    context.insert("menu_items", &state.catalog().items_ordered());
    context.insert("role_grants", &Vec::<String>::new());
    context.insert("path", "/admin/people/roles/add");

    render_template(&state, "admin/role-form.html", &context)
}

/// Handle add role form submission.
///
/// POST /admin/people/roles/add
async fn add_role_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RoleFormData>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    // Verify CSRF token
    if let Err(resp) = require_csrf(&session, &form.token).await {
        return resp;
    }

    // Validate
    let mut errors = Vec::new();

    if form.name.trim().is_empty() {
        errors.push("Role name is required.".to_string());
    }

    if form.display_name.trim().is_empty() {
        errors.push("Display name is required.".to_string());
    }

    // Check if role name already exists
    if let Ok(Some(_)) = Role::find_by_name(state.db(), &form.name).await {
        errors.push(format!("A role named '{}' already exists.", form.name));
    }

    let grants = selected_grants(state.catalog(), &form.grants);

    if !errors.is_empty() {
        let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
        let form_build_id = Uuid::new_v4().to_string();

        let mut context = page_context(&state, &session, &current_user).await;
        context.insert("action", "/admin/people/roles/add");
        context.insert("csrf_token", &csrf_token);
        context.insert("form_build_id", &form_build_id);
        context.insert("editing", &false);
        context.insert("errors", &errors);
        context.insert(
            "values",
            &serde_json::json!({
                "name": form.name,
                "display_name": form.display_name,
            }),
        );
        context.insert("menu_items", &state.catalog().items_ordered());
        context.insert("role_grants", &grants);
        context.insert("path", "/admin/people/roles/add");

        return render_template(&state, "admin/role-form.html", &context);
    }

    match Role::create(state.db(), &form.name, &form.display_name, &grants).await {
        Ok(role) => {
            tracing::info!(name = %form.name, role_id = %role.id, "role created");
            Redirect::to("/admin/people/roles").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to create role");
            render_server_error("Failed to create role.")
        }
    }
}

/// Show edit role form.
///
/// GET /admin/people/roles/{id}/edit
async fn edit_role_form(
    State(state): State<AppState>,
    session: Session,
    Path(role_id): Path<Uuid>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let Some(role) = Role::find_by_id(state.db(), role_id).await.ok().flatten() else {
        return render_not_found();
    };

    let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
    let form_build_id = Uuid::new_v4().to_string();

    let mut context = page_context(&state, &session, &current_user).await;
    context.insert("action", &format!("/admin/people/roles/{role_id}/edit"));
    context.insert("csrf_token", &csrf_token);
    context.insert("form_build_id", &form_build_id);
    context.insert("editing", &true);
    context.insert("role_id", &role_id.to_string());
    context.insert(
        "values",
        &serde_json::json!({
            "name": role.name,
            "display_name": role.display_name,
        }),
    );
    context.insert("menu_items", &state.catalog().items_ordered());
    context.insert("role_grants", &role.grant_keys());
    context.insert("path", &format!("/admin/people/roles/{role_id}/edit"));

    render_template(&state, "admin/role-form.html", &context)
}

/// Handle edit role form submission.
///
/// POST /admin/people/roles/{id}/edit
async fn edit_role_submit(
    State(state): State<AppState>,
    session: Session,
    Path(role_id): Path<Uuid>,
    Form(form): Form<RoleFormData>,
) -> Response {
    let current_user = match require_admin(&state, &session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    // Verify CSRF token
    if let Err(resp) = require_csrf(&session, &form.token).await {
        return resp;
    }

    let Some(existing_role) = Role::find_by_id(state.db(), role_id).await.ok().flatten() else {
        return render_not_found();
    };

    // Validate
    let mut errors = Vec::new();

    if form.name.trim().is_empty() {
        errors.push("Role name is required.".to_string());
    }

    if form.display_name.trim().is_empty() {
        errors.push("Display name is required.".to_string());
    }

    // Check if new name is taken by someone else
    if form.name != existing_role.name
        && let Ok(Some(_)) = Role::find_by_name(state.db(), &form.name).await
    {
        errors.push(format!("A role named '{}' already exists.", form.name));
    }

    let grants = selected_grants(state.catalog(), &form.grants);

    if !errors.is_empty() {
        let csrf_token = generate_csrf_token(&session).await.unwrap_or_default();
        let form_build_id = Uuid::new_v4().to_string();

        let mut context = page_context(&state, &session, &current_user).await;
        context.insert("action", &format!("/admin/people/roles/{role_id}/edit"));
        context.insert("csrf_token", &csrf_token);
        context.insert("form_build_id", &form_build_id);
        context.insert("editing", &true);
        context.insert("role_id", &role_id.to_string());
        context.insert("errors", &errors);
        context.insert(
            "values",
            &serde_json::json!({
                "name": form.name,
                "display_name": form.display_name,
            }),
        );
        context.insert("menu_items", &state.catalog().items_ordered());
        context.insert("role_grants", &grants);
        context.insert("path", &format!("/admin/people/roles/{role_id}/edit"));

        return render_template(&state, "admin/role-form.html", &context);
    }

    match Role::update(state.db(), role_id, &form.name, &form.display_name, &grants).await {
        Ok(Some(_)) => {
            // Every user carrying this role resolves fresh grants next request.
            state.permissions().invalidate_all();
            tracing::info!(role_id = %role_id, "role updated");
            Redirect::to("/admin/people/roles").into_response()
        }
        Ok(None) => render_not_found(),
        Err(e) => {
            tracing::error!(error = %e, "failed to update role");
            render_server_error("Failed to update role.")
        }
    }
}

/// Delete a role.
///
/// POST /admin/people/roles/{id}/delete
async fn delete_role(
    State(state): State<AppState>,
    session: Session,
    Path(role_id): Path<Uuid>,
    Form(form): Form<CsrfOnlyForm>,
) -> Response {
    if let Err(redirect) = require_admin(&state, &session).await {
        return redirect;
    }

    if let Err(resp) = require_csrf(&session, &form.token).await {
        return resp;
    }

    let Some(role) = Role::find_by_id(state.db(), role_id).await.ok().flatten() else {
        return render_not_found();
    };

    // Prevent deleting built-in roles
    if role.is_system {
        return render_error("Cannot delete a built-in role.");
    }

    match Role::assigned_users(state.db(), role_id).await {
        Ok(0) => {}
        Ok(_) => {
            return render_error("Cannot delete a role that is still assigned to users.");
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to count role assignments");
            return render_server_error("Failed to delete role.");
        }
    }

    match Role::delete(state.db(), role_id).await {
        Ok(true) => {
            state.permissions().invalidate_all();
            tracing::info!(role_id = %role_id, "role deleted");
            Redirect::to("/admin/people/roles").into_response()
        }
        Ok(false) => render_not_found(),
        Err(e) => {
            tracing::error!(error = %e, "failed to delete role");
            render_server_error("Failed to delete role.")
        }
    }
}

/// Build the router for admin user and role routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/people", get(list_users))
        .route(
            "/admin/people/add",
            get(add_user_form).post(add_user_submit),
        )
        .route(
            "/admin/people/{id}/edit",
            get(edit_user_form).post(edit_user_submit),
        )
        .route("/admin/people/{id}/delete", post(delete_user))
        .route("/admin/people/roles", get(list_roles))
        .route(
            "/admin/people/roles/add",
            get(add_role_form).post(add_role_submit),
        )
        .route(
            "/admin/people/roles/{id}/edit",
            get(edit_role_form).post(edit_role_submit),
        )
        .route("/admin/people/roles/{id}/delete", post(delete_role))
}
