//! Menu catalog - the static registry of every addressable application section.
//!
//! The catalog is built once at startup (from the compiled-in table or a TOML
//! file) and is immutable for the process lifetime. Everything that names a
//! menu key resolves it here: the authorization gate, the permission editor,
//! new-user provisioning, and sidebar rendering.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::CatalogError;
use crate::authz::Role;

/// One addressable application section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    /// Unique stable identifier, the sole lookup token.
    pub key: String,
    /// Human-readable name shown in navigation.
    pub label: String,
    /// Icon name for the sidebar (presentation only).
    #[serde(default)]
    pub icon: String,
    /// Route prefix this section is served under (e.g., "/pos").
    pub route: String,
    /// Admin-restricted section. Advisory for rendering and the permission
    /// editor; enforcement is the gate's membership test.
    #[serde(default)]
    pub admin_only: bool,
    /// Safe redirect target for denied requests. At most one item per
    /// catalog is honored.
    #[serde(default)]
    pub fallback_safe: bool,
}

/// Named ordered collection of menu item keys. Presentation grouping only,
/// no authorization semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuGroup {
    /// Group machine name (e.g., "main").
    pub key: String,
    /// Display label.
    pub label: String,
    /// Member item keys, in render order.
    pub items: Vec<String>,
}

/// On-disk catalog definition (TOML).
#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    /// Baseline keys granted to freshly created non-admin users.
    #[serde(default)]
    default_permissions: Vec<String>,
    /// All menu items, in definition order.
    items: Vec<MenuItem>,
    /// Presentation groups referencing item keys.
    #[serde(default)]
    groups: Vec<MenuGroup>,
}

/// A sidebar group resolved for one user, ready for template rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SidebarGroup {
    pub label: String,
    pub items: Vec<MenuItem>,
}

/// Static registry of all menu definitions.
///
/// Constructed once, shared by reference (`Arc`) from application state, and
/// never mutated afterwards. Changing the catalog requires a restart.
#[derive(Debug)]
pub struct MenuCatalog {
    /// All items, indexed by key.
    items: HashMap<String, MenuItem>,
    /// Item keys in definition order (stable for permission-editor UI).
    ordered_keys: Vec<String>,
    /// Presentation groups, pruned to known keys.
    groups: Vec<MenuGroup>,
    /// Baseline permission keys for new non-admin users, in catalog order.
    defaults: Vec<String>,
    /// Key of the unique fallback-safe item, when one exists.
    fallback_key: Option<String>,
    /// Route prefixes sorted longest-first for request matching.
    routes: Vec<(String, String)>,
}

impl MenuCatalog {
    /// Build the compiled-in catalog.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_file(builtin_definition())
    }

    /// Parse a catalog from TOML.
    pub fn from_toml(input: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(input)?;
        Self::from_file(file)
    }

    /// Load the catalog from an optional file path, falling back to the
    /// compiled-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(p) => {
                let input =
                    std::fs::read_to_string(p).map_err(|source| CatalogError::Unreadable {
                        path: p.display().to_string(),
                        source,
                    })?;
                let catalog = Self::from_toml(&input)?;
                debug!(path = %p.display(), items = catalog.len(), "loaded menu catalog from file");
                Ok(catalog)
            }
            None => Self::builtin(),
        }
    }

    /// Validate a parsed definition and build the derived tables.
    fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut items = HashMap::new();
        let mut ordered_keys = Vec::new();
        let mut fallback_key: Option<String> = None;

        for mut item in file.items {
            if item.key.is_empty() {
                return Err(CatalogError::EmptyKey {
                    label: item.label.clone(),
                });
            }
            if !item.route.starts_with('/') {
                return Err(CatalogError::RouteNotRooted {
                    key: item.key.clone(),
                    route: item.route.clone(),
                });
            }
            if items.contains_key(&item.key) {
                return Err(CatalogError::DuplicateKey {
                    key: item.key.clone(),
                });
            }

            if item.fallback_safe {
                match &fallback_key {
                    None => fallback_key = Some(item.key.clone()),
                    Some(existing) => {
                        warn!(
                            key = %item.key,
                            fallback = %existing,
                            "ignoring extra fallback_safe item; first wins"
                        );
                        // Clear the flag so the stored item agrees with the
                        // single honored fallback.
                        item.fallback_safe = false;
                    }
                }
            }

            ordered_keys.push(item.key.clone());
            items.insert(item.key.clone(), item);
        }

        // Prune group members that name unknown keys; unknown keys are inert.
        let groups = file
            .groups
            .into_iter()
            .map(|mut group| {
                group.items.retain(|key| {
                    let known = items.contains_key(key);
                    if !known {
                        warn!(group = %group.key, key = %key, "dropping unknown key from menu group");
                    }
                    known
                });
                group
            })
            .collect();

        // Default grants follow the same rule; keep catalog order.
        let requested: HashSet<&String> = file.default_permissions.iter().collect();
        for key in &file.default_permissions {
            if !items.contains_key(key) {
                warn!(key = %key, "dropping unknown key from default permissions");
            }
        }
        let defaults: Vec<String> = ordered_keys
            .iter()
            .filter(|key| requested.contains(key))
            .cloned()
            .collect();

        // Longest route first so "/admin/people" wins over "/admin".
        let mut routes: Vec<(String, String)> = items
            .values()
            .map(|item| (item.route.clone(), item.key.clone()))
            .collect();
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            items,
            ordered_keys,
            groups,
            defaults,
            fallback_key,
            routes,
        })
    }

    /// Look up a menu item by key.
    ///
    /// Unknown keys are `None`. Callers must treat that as "deny", never as
    /// "no restriction" — an unregistered key cannot be proven safe.
    pub fn lookup(&self, key: &str) -> Option<&MenuItem> {
        self.items.get(key)
    }

    /// All item keys in definition order.
    ///
    /// The order is stable so the permission editor renders deterministic
    /// checkbox lists.
    pub fn all_keys(&self) -> &[String] {
        &self.ordered_keys
    }

    /// All items in definition order.
    pub fn items_ordered(&self) -> Vec<&MenuItem> {
        self.ordered_keys
            .iter()
            .filter_map(|key| self.items.get(key))
            .collect()
    }

    /// Baseline keys granted to new non-admin users, in catalog order.
    ///
    /// Consumed exactly once per account, at provisioning time.
    pub fn default_permissions(&self) -> &[String] {
        &self.defaults
    }

    /// The designated safe redirect target, when the catalog has one.
    pub fn fallback(&self) -> Option<&MenuItem> {
        self.fallback_key.as_deref().and_then(|key| self.items.get(key))
    }

    /// Resolve a request path to the menu item that owns it.
    ///
    /// Longest route prefix wins. Paths under no registered route are
    /// unprotected utility routes (login, health, static assets).
    pub fn match_route(&self, path: &str) -> Option<&MenuItem> {
        for (route, key) in &self.routes {
            if let Some(rest) = path.strip_prefix(route.as_str()) {
                if rest.is_empty() || rest.starts_with('/') {
                    return self.items.get(key);
                }
            }
        }
        None
    }

    /// Filter requested grant keys down to assignable ones.
    ///
    /// Unknown keys and admin-restricted keys never survive a grant write;
    /// the result is deduplicated and in catalog order. This is how
    /// admin-only sections stay out of non-admin permission sets by
    /// construction.
    pub fn sanitize_grants<I, S>(&self, requested: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: HashSet<String> = requested
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .collect();

        self.ordered_keys
            .iter()
            .filter(|key| requested.contains(*key))
            .filter_map(|key| self.items.get(key))
            .filter(|item| !item.admin_only)
            .map(|item| item.key.clone())
            .collect()
    }

    /// Presentation groups, in definition order.
    pub fn groups(&self) -> &[MenuGroup] {
        &self.groups
    }

    /// Build the sidebar for one user: groups with the items that user may
    /// see. Admin-restricted items are hidden from non-admin users
    /// regardless of stored grants.
    pub fn sidebar_for(&self, role: &Role) -> Vec<SidebarGroup> {
        self.groups
            .iter()
            .filter_map(|group| {
                let items: Vec<MenuItem> = group
                    .items
                    .iter()
                    .filter_map(|key| self.items.get(key))
                    .filter(|item| match role {
                        Role::Admin => true,
                        Role::Standard(_) => !item.admin_only && role.grants(&item.key),
                    })
                    .cloned()
                    .collect();

                if items.is_empty() {
                    None
                } else {
                    Some(SidebarGroup {
                        label: group.label.clone(),
                        items,
                    })
                }
            })
            .collect()
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The compiled-in catalog: every section of the application.
fn builtin_definition() -> CatalogFile {
    fn item(
        key: &str,
        label: &str,
        icon: &str,
        route: &str,
        admin_only: bool,
        fallback_safe: bool,
    ) -> MenuItem {
        MenuItem {
            key: key.to_string(),
            label: label.to_string(),
            icon: icon.to_string(),
            route: route.to_string(),
            admin_only,
            fallback_safe,
        }
    }

    fn group(key: &str, label: &str, items: &[&str]) -> MenuGroup {
        MenuGroup {
            key: key.to_string(),
            label: label.to_string(),
            items: items.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    CatalogFile {
        default_permissions: vec!["dashboard".to_string(), "pos".to_string()],
        items: vec![
            item("dashboard", "Dashboard", "home", "/dashboard", false, true),
            item("pos", "Point of Sale", "cart", "/pos", false, false),
            item("products", "Products", "box", "/products", false, false),
            item("inventory", "Stock Control", "layers", "/inventory", false, false),
            item("transactions", "Transactions", "receipt", "/transactions", false, false),
            item("reports", "Reports", "chart", "/reports", false, false),
            item("users", "Users & Roles", "people", "/admin/people", true, false),
            item("settings", "Settings", "gear", "/admin/settings", true, false),
        ],
        groups: vec![
            group("main", "Main", &["dashboard", "pos"]),
            group("inventory", "Inventory", &["products", "inventory"]),
            group("insights", "Insights", &["transactions", "reports"]),
            group("admin", "Administration", &["users", "settings"]),
        ],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_catalog_shape() {
        let catalog = MenuCatalog::builtin().unwrap();

        assert_eq!(catalog.len(), 8);
        assert!(catalog.lookup("dashboard").is_some());
        assert!(catalog.lookup("pos").is_some());
        assert!(catalog.lookup("missing").is_none());

        // Definition order is stable.
        assert_eq!(catalog.all_keys()[0], "dashboard");
        assert_eq!(catalog.all_keys()[1], "pos");

        // Baseline grants are the entry screen and the primary operational screen.
        assert_eq!(catalog.default_permissions(), ["dashboard", "pos"]);

        // The dashboard is the safe redirect target.
        let fallback = catalog.fallback().unwrap();
        assert_eq!(fallback.key, "dashboard");
        assert_eq!(fallback.route, "/dashboard");
    }

    #[test]
    fn builtin_admin_sections_are_flagged() {
        let catalog = MenuCatalog::builtin().unwrap();
        assert!(catalog.lookup("users").unwrap().admin_only);
        assert!(catalog.lookup("settings").unwrap().admin_only);
        assert!(!catalog.lookup("pos").unwrap().admin_only);
    }

    #[test]
    fn from_toml_parses() {
        let catalog = MenuCatalog::from_toml(
            r#"
            default_permissions = ["home"]

            [[items]]
            key = "home"
            label = "Home"
            route = "/home"
            fallback_safe = true

            [[items]]
            key = "sales"
            label = "Sales"
            route = "/sales"

            [[groups]]
            key = "main"
            label = "Main"
            items = ["home", "sales"]
            "#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.default_permissions(), ["home"]);
        assert_eq!(catalog.fallback().unwrap().key, "home");
        assert_eq!(catalog.groups().len(), 1);
    }

    #[test]
    fn from_toml_duplicate_key_rejected() {
        let err = MenuCatalog::from_toml(
            r#"
            [[items]]
            key = "home"
            label = "Home"
            route = "/home"

            [[items]]
            key = "home"
            label = "Again"
            route = "/again"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, CatalogError::DuplicateKey { key } if key == "home"));
    }

    #[test]
    fn from_toml_bad_route_rejected() {
        let err = MenuCatalog::from_toml(
            r#"
            [[items]]
            key = "home"
            label = "Home"
            route = "home"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, CatalogError::RouteNotRooted { key, .. } if key == "home"));
    }

    #[test]
    fn unknown_keys_are_inert() {
        let catalog = MenuCatalog::from_toml(
            r#"
            default_permissions = ["home", "ghost"]

            [[items]]
            key = "home"
            label = "Home"
            route = "/home"

            [[groups]]
            key = "main"
            label = "Main"
            items = ["home", "phantom"]
            "#,
        )
        .unwrap();

        // Unknown defaults and group members are dropped, not matched.
        assert_eq!(catalog.default_permissions(), ["home"]);
        assert_eq!(catalog.groups()[0].items, ["home"]);
    }

    #[test]
    fn extra_fallback_items_ignored() {
        let catalog = MenuCatalog::from_toml(
            r#"
            [[items]]
            key = "first"
            label = "First"
            route = "/first"
            fallback_safe = true

            [[items]]
            key = "second"
            label = "Second"
            route = "/second"
            fallback_safe = true
            "#,
        )
        .unwrap();

        assert_eq!(catalog.fallback().unwrap().key, "first");
        // The loser's flag is cleared, not just outranked.
        assert!(!catalog.lookup("second").unwrap().fallback_safe);
    }

    #[test]
    fn match_route_longest_prefix_wins() {
        let catalog = MenuCatalog::builtin().unwrap();

        assert_eq!(catalog.match_route("/pos").unwrap().key, "pos");
        assert_eq!(catalog.match_route("/pos/checkout").unwrap().key, "pos");
        assert_eq!(catalog.match_route("/products/42/edit").unwrap().key, "products");
        assert_eq!(catalog.match_route("/admin/people/add").unwrap().key, "users");
        assert_eq!(catalog.match_route("/admin/settings").unwrap().key, "settings");

        // Unregistered paths are not protected sections.
        assert!(catalog.match_route("/").is_none());
        assert!(catalog.match_route("/user/login").is_none());
        assert!(catalog.match_route("/health").is_none());
        // Prefixes only match on segment boundaries.
        assert!(catalog.match_route("/positive").is_none());
    }

    #[test]
    fn sanitize_grants_drops_unknown_and_admin_only() {
        let catalog = MenuCatalog::builtin().unwrap();

        let granted = catalog.sanitize_grants(["pos", "ghost", "users", "dashboard", "pos"]);

        // Catalog order, deduplicated, no admin-only and no unknown keys.
        assert_eq!(granted, ["dashboard", "pos"]);
    }

    #[test]
    fn sidebar_filters_per_role() {
        let catalog = MenuCatalog::builtin().unwrap();

        let admin = catalog.sidebar_for(&Role::Admin);
        let admin_keys: Vec<&str> = admin
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.key.as_str()))
            .collect();
        assert!(admin_keys.contains(&"users"));
        assert!(admin_keys.contains(&"settings"));

        let cashier = Role::Standard(HashSet::from(["dashboard".to_string(), "pos".to_string()]));
        let sidebar = catalog.sidebar_for(&cashier);
        assert_eq!(sidebar.len(), 1);
        assert_eq!(sidebar[0].label, "Main");
        let keys: Vec<&str> = sidebar[0].items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["dashboard", "pos"]);
    }

    #[test]
    fn sidebar_hides_admin_items_even_if_granted() {
        let catalog = MenuCatalog::builtin().unwrap();

        // A stale grant for an admin-only key must not surface in navigation.
        let role = Role::Standard(HashSet::from(["dashboard".to_string(), "users".to_string()]));
        let sidebar = catalog.sidebar_for(&role);
        let keys: Vec<&str> = sidebar
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.key.as_str()))
            .collect();
        assert_eq!(keys, ["dashboard"]);
    }
}
