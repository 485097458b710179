#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Menu catalog tests over a replacement catalog definition.
//!
//! The compiled-in table has its own unit tests; these cover a deployment
//! that ships its own catalog file.

use tillpoint_server::authz::Role;
use tillpoint_server::menu::MenuCatalog;

const CUSTOM_CATALOG: &str = r#"
default_permissions = ["till", "stock"]

[[items]]
key = "till"
label = "Till"
icon = "cash-register"
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

[[groups]]
key = "daily"
label = "Daily"
items = ["till", "stock"]

[[groups]]
key = "manage"
label = "Management"
items = ["staff"]
"#;

fn custom_catalog() -> MenuCatalog {
    MenuCatalog::from_toml(CUSTOM_CATALOG).unwrap()
}

#[test]
fn test_catalog_from_custom_definition() {
    let catalog = custom_catalog();

    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.fallback().unwrap().key, "till");
    assert_eq!(catalog.default_permissions(), ["till", "stock"]);
    assert_eq!(catalog.groups().len(), 2);
    assert!(catalog.lookup("staff").unwrap().admin_only);
    assert!(catalog.lookup("checkout").is_none());
}

#[test]
fn test_route_matching_follows_custom_routes() {
    let catalog = custom_catalog();

    assert_eq!(catalog.match_route("/till").unwrap().key, "till");
    assert_eq!(catalog.match_route("/stock/low").unwrap().key, "stock");
    assert_eq!(
        catalog.match_route("/manage/staff/5/edit").unwrap().key,
        "staff"
    );

    // "/manage" alone is not a registered route prefix.
    assert!(catalog.match_route("/manage").is_none());
    // Prefixes only match on segment boundaries.
    assert!(catalog.match_route("/tillage").is_none());
}

#[test]
fn test_sanitize_against_custom_catalog() {
    let catalog = custom_catalog();

    let granted = catalog.sanitize_grants(["stock", "staff", "checkout", "till"]);

    assert_eq!(granted, ["till", "stock"]);
}

#[test]
fn test_sidebar_uses_custom_groups() {
    let catalog = custom_catalog();

    let cashier = Role::Standard(["till"].iter().map(|k| (*k).to_string()).collect());
    let sidebar = catalog.sidebar_for(&cashier);
    assert_eq!(sidebar.len(), 1);
    assert_eq!(sidebar[0].label, "Daily");
    assert_eq!(sidebar[0].items.len(), 1);
    assert_eq!(sidebar[0].items[0].key, "till");

    let sidebar = catalog.sidebar_for(&Role::Admin);
    assert_eq!(sidebar.len(), 2);
    assert_eq!(sidebar[1].label, "Management");
    assert_eq!(sidebar[1].items[0].key, "staff");
}

#[test]
fn test_load_without_file_uses_builtin() {
    let catalog = MenuCatalog::load(None).unwrap();

    assert_eq!(catalog.len(), 8);
    assert_eq!(catalog.fallback().unwrap().key, "dashboard");
}
