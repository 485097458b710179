//! Operational section screens: point of sale, products, inventory,
//! transactions and reports.
//!
//! Access control happens in the menu gate middleware before a handler
//! runs; handlers only establish the signed-in user and render.

use axum::Router;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use tower_sessions::Session;

use crate::routes::helpers::{page_context, render_not_found, render_template, require_login};
use crate::state::AppState;

/// Render the placeholder screen for a registered menu section.
async fn section_page(state: &AppState, session: &Session, key: &str) -> Response {
    let user = match require_login(state, session).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let Some(item) = state.catalog().lookup(key) else {
        return render_not_found();
    };

    let mut context = page_context(state, session, &user).await;
    context.insert("section", item);
    context.insert("path", &item.route);

    render_template(state, "section.html", &context)
}

/// GET /pos
async fn pos(State(state): State<AppState>, session: Session) -> Response {
    section_page(&state, &session, "pos").await
}

/// GET /products
async fn products(State(state): State<AppState>, session: Session) -> Response {
    section_page(&state, &session, "products").await
}

/// GET /inventory
async fn inventory(State(state): State<AppState>, session: Session) -> Response {
    section_page(&state, &session, "inventory").await
}

/// GET /transactions
async fn transactions(State(state): State<AppState>, session: Session) -> Response {
    section_page(&state, &session, "transactions").await
}

/// GET /reports
async fn reports(State(state): State<AppState>, session: Session) -> Response {
    section_page(&state, &session, "reports").await
}

/// Create the section router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pos", get(pos))
        .route("/products", get(products))
        .route("/inventory", get(inventory))
        .route("/transactions", get(transactions))
        .route("/reports", get(reports))
}
