#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Authorization gate tests.

use std::sync::Arc;

use tillpoint_server::authz::{ACCESS_DENIED_MESSAGE, Decision, MenuGate, Role, Subject};
use tillpoint_server::menu::MenuCatalog;
use uuid::Uuid;

const CUSTOM_CATALOG: &str = r#"
[[items]]
key = "till"
label = "Till"
route = "/till"
fallback_safe = true

[[items]]
key = "stock"
label = "Stock"
route = "/stock"

[[items]]
key = "staff"
label = "Staff"
route = "/manage/staff"
admin_only = true
"#;

fn custom_gate() -> MenuGate {
    MenuGate::new(Arc::new(MenuCatalog::from_toml(CUSTOM_CATALOG).unwrap()))
}

fn standard(keys: &[&str]) -> Subject {
    Subject {
        user_id: Uuid::now_v7(),
        role: Role::Standard(keys.iter().map(|k| (*k).to_string()).collect()),
    }
}

fn admin() -> Subject {
    Subject {
        user_id: Uuid::now_v7(),
        role: Role::Admin,
    }
}

#[test]
fn test_deny_redirect_follows_catalog_fallback() {
    let gate = custom_gate();
    let subject = standard(&[]);

    // The redirect target comes from the catalog, not from any fixed page.
    assert_eq!(
        gate.evaluate(Some(&subject), "stock", false),
        Decision::DenyRedirect {
            target: "/till".to_string(),
            message: ACCESS_DENIED_MESSAGE.to_string(),
        }
    );
}

#[test]
fn test_deny_on_fallback_key_is_forbidden() {
    let gate = custom_gate();
    let subject = standard(&["stock"]);

    assert_eq!(
        gate.evaluate(Some(&subject), "till", false),
        Decision::DenyForbidden {
            message: ACCESS_DENIED_MESSAGE.to_string(),
        }
    );
}

#[test]
fn test_deny_on_fallback_route_is_forbidden() {
    let gate = custom_gate();
    let subject = standard(&[]);

    // Already on /till: a redirect would loop, so the deny hard-stops.
    assert_eq!(
        gate.evaluate(Some(&subject), "stock", true),
        Decision::DenyForbidden {
            message: ACCESS_DENIED_MESSAGE.to_string(),
        }
    );
}

#[test]
fn test_catalog_without_fallback_forbids_everywhere() {
    let catalog = MenuCatalog::from_toml(
        r#"
        [[items]]
        key = "till"
        label = "Till"
        route = "/till"

        [[items]]
        key = "stock"
        label = "Stock"
        route = "/stock"
        "#,
    )
    .unwrap();
    let gate = MenuGate::new(Arc::new(catalog));
    let subject = standard(&[]);

    for key in ["till", "stock", "ghost"] {
        assert!(matches!(
            gate.evaluate(Some(&subject), key, false),
            Decision::DenyForbidden { .. }
        ));
    }
}

#[test]
fn test_admin_needs_no_grants() {
    let gate = custom_gate();
    let subject = admin();

    assert_eq!(gate.evaluate(Some(&subject), "staff", false), Decision::Allow);
    assert_eq!(gate.evaluate(Some(&subject), "stock", false), Decision::Allow);
    // Admins pass even for keys the catalog has never registered.
    assert_eq!(gate.evaluate(Some(&subject), "ghost", false), Decision::Allow);
}

#[test]
fn test_grant_membership_is_exact() {
    let gate = custom_gate();
    let subject = standard(&["till"]);

    assert_eq!(gate.evaluate(Some(&subject), "till", false), Decision::Allow);
    // Keys are case sensitive and never fuzzy-matched.
    assert!(matches!(
        gate.evaluate(Some(&subject), "Till", false),
        Decision::DenyRedirect { .. }
    ));
    assert!(matches!(
        gate.evaluate(Some(&subject), "stock", false),
        Decision::DenyRedirect { .. }
    ));
}

#[test]
fn test_unauthenticated_passes_through() {
    let gate = custom_gate();

    assert_eq!(
        gate.evaluate(None, "till", false),
        Decision::PassUnauthenticated
    );
    assert_eq!(
        gate.evaluate(None, "ghost", true),
        Decision::PassUnauthenticated
    );
}

#[test]
fn test_denied_message_text() {
    let gate = custom_gate();
    let subject = standard(&[]);

    match gate.evaluate(Some(&subject), "stock", false) {
        Decision::DenyRedirect { message, .. } => {
            assert_eq!(
                message,
                "Access Denied. You do not have permission to access this page."
            );
        }
        other => panic!("expected DenyRedirect, got {other:?}"),
    }
}

#[test]
fn test_sanitized_grants_are_always_evaluable() {
    let catalog = Arc::new(MenuCatalog::from_toml(CUSTOM_CATALOG).unwrap());
    let gate = MenuGate::new(catalog.clone());

    // An over-broad request: unknown keys and an admin-only key included.
    let sanitized = catalog.sanitize_grants(["till", "stock", "staff", "ghost"]);
    assert_eq!(sanitized, ["till", "stock"]);

    let subject = Subject {
        user_id: Uuid::now_v7(),
        role: Role::Standard(sanitized.iter().cloned().collect()),
    };

    // Every key that survives sanitization is actually usable.
    for key in &sanitized {
        assert_eq!(gate.evaluate(Some(&subject), key, false), Decision::Allow);
    }

    // The admin-only key was dropped, so it stays denied.
    assert!(matches!(
        gate.evaluate(Some(&subject), "staff", false),
        Decision::DenyRedirect { .. }
    ));
}
