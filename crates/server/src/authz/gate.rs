//! The authorization gate: one pure decision per request.
//!
//! `MenuGate::evaluate` is a function of the subject snapshot, the requested
//! menu key, and the immutable catalog. It performs no I/O and never fails;
//! resolving the subject (session, database, cache) happens before the call,
//! and translating the decision into an HTTP response happens after it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::menu::MenuCatalog;

/// Fixed user-facing text attached to every deny decision.
pub const ACCESS_DENIED_MESSAGE: &str =
    "Access Denied. You do not have permission to access this page.";

/// A user's authorization role.
///
/// Admin is a distinct variant rather than a permission entry: admins bypass
/// the membership test entirely, so no grant set is carried for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Unconditional access to every section, including keys the catalog
    /// does not know.
    Admin,
    /// Access limited to the contained menu keys.
    Standard(HashSet<String>),
}

impl Role {
    /// Whether this role's own grant set names the key. Admin grants
    /// everything.
    pub fn grants(&self, key: &str) -> bool {
        match self {
            Role::Admin => true,
            Role::Standard(keys) => keys.contains(key),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// An authenticated principal with its role fully resolved.
///
/// Built by the caller from session + storage before evaluation; the gate
/// never reaches back into either.
#[derive(Debug, Clone)]
pub struct Subject {
    pub user_id: Uuid,
    pub role: Role,
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Continue the request.
    Allow,
    /// No subject was presented; authentication (a separate layer) takes
    /// over. The gate makes no judgment about anonymous traffic.
    PassUnauthenticated,
    /// Denied, with a safe page to land on.
    DenyRedirect { target: String, message: String },
    /// Denied with no safe page left; the request stops here.
    DenyForbidden { message: String },
}

/// Per-request authorization over the menu catalog.
#[derive(Debug, Clone)]
pub struct MenuGate {
    catalog: Arc<MenuCatalog>,
}

impl MenuGate {
    pub fn new(catalog: Arc<MenuCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &MenuCatalog {
        &self.catalog
    }

    /// Decide whether `subject` may access the section named `menu_key`.
    ///
    /// `on_fallback_route` tells the gate that the request already targets
    /// the fallback item's route, which turns a would-be redirect into a
    /// hard stop (redirecting the fallback route to itself would loop).
    ///
    /// The checks run in strict order:
    ///
    /// 1. no subject: pass through to the authentication layer;
    /// 2. admin: allow, without consulting the catalog;
    /// 3. key registered and in the subject's grant set: allow;
    /// 4. otherwise deny. Unknown keys land here too: a key the catalog
    ///    cannot vouch for is never allowed, even when a stale grant set
    ///    still names it.
    pub fn evaluate(
        &self,
        subject: Option<&Subject>,
        menu_key: &str,
        on_fallback_route: bool,
    ) -> Decision {
        let Some(subject) = subject else {
            return Decision::PassUnauthenticated;
        };

        if subject.role.is_admin() {
            return Decision::Allow;
        }

        if self.catalog.lookup(menu_key).is_some() && subject.role.grants(menu_key) {
            return Decision::Allow;
        }

        debug!(user_id = %subject.user_id, key = %menu_key, "menu access denied");

        match self.catalog.fallback() {
            Some(fallback) if fallback.key != menu_key && !on_fallback_route => {
                Decision::DenyRedirect {
                    target: fallback.route.clone(),
                    message: ACCESS_DENIED_MESSAGE.to_string(),
                }
            }
            // Denied on the fallback itself, or no fallback exists: there is
            // no page left that is known safe to send the user to.
            _ => Decision::DenyForbidden {
                message: ACCESS_DENIED_MESSAGE.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn gate() -> MenuGate {
        MenuGate::new(Arc::new(MenuCatalog::builtin().unwrap()))
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
    fn admin_allows_every_key() {
        let gate = gate();
        let subject = admin();

        for key in gate.catalog().all_keys() {
            assert_eq!(gate.evaluate(Some(&subject), key, false), Decision::Allow);
        }
        // Including keys no catalog has ever heard of.
        assert_eq!(
            gate.evaluate(Some(&subject), "nonexistent_key", false),
            Decision::Allow
        );
    }

    #[test]
    fn standard_allowed_only_for_granted_keys() {
        let gate = gate();
        let subject = standard(&["dashboard", "pos"]);

        assert_eq!(gate.evaluate(Some(&subject), "pos", false), Decision::Allow);
        assert_eq!(
            gate.evaluate(Some(&subject), "dashboard", false),
            Decision::Allow
        );
        assert!(matches!(
            gate.evaluate(Some(&subject), "reports", false),
            Decision::DenyRedirect { .. }
        ));
    }

    #[test]
    fn deny_redirects_to_fallback_with_message() {
        let gate = gate();
        let subject = standard(&["dashboard"]);

        assert_eq!(
            gate.evaluate(Some(&subject), "reports", false),
            Decision::DenyRedirect {
                target: "/dashboard".to_string(),
                message: ACCESS_DENIED_MESSAGE.to_string(),
            }
        );
    }

    #[test]
    fn deny_on_fallback_key_is_forbidden() {
        let gate = gate();
        // No dashboard grant at all: redirecting to the dashboard would
        // just be denied again.
        let subject = standard(&["pos"]);

        assert_eq!(
            gate.evaluate(Some(&subject), "dashboard", false),
            Decision::DenyForbidden {
                message: ACCESS_DENIED_MESSAGE.to_string(),
            }
        );
    }

    #[test]
    fn deny_on_fallback_route_is_forbidden() {
        let gate = gate();
        let subject = standard(&[]);

        // The request already sits on the fallback route; even a deny for a
        // different key must not bounce it back there.
        assert_eq!(
            gate.evaluate(Some(&subject), "reports", true),
            Decision::DenyForbidden {
                message: ACCESS_DENIED_MESSAGE.to_string(),
            }
        );
    }

    #[test]
    fn unauthenticated_passes_for_any_key() {
        let gate = gate();

        assert_eq!(
            gate.evaluate(None, "pos", false),
            Decision::PassUnauthenticated
        );
        assert_eq!(
            gate.evaluate(None, "nonexistent_key", false),
            Decision::PassUnauthenticated
        );
        assert_eq!(
            gate.evaluate(None, "dashboard", true),
            Decision::PassUnauthenticated
        );
    }

    #[test]
    fn unknown_key_never_allows_standard_users() {
        let gate = gate();
        // Even a grant set that still names a long-removed key must not be
        // trusted for it.
        let subject = standard(&["nonexistent_key"]);

        assert!(matches!(
            gate.evaluate(Some(&subject), "nonexistent_key", false),
            Decision::DenyRedirect { .. }
        ));
        assert!(matches!(
            gate.evaluate(Some(&subject), "nonexistent_key", true),
            Decision::DenyForbidden { .. }
        ));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let gate = gate();
        let subject = standard(&["pos"]);

        let first = gate.evaluate(Some(&subject), "reports", false);
        for _ in 0..10 {
            assert_eq!(gate.evaluate(Some(&subject), "reports", false), first);
        }
    }

    #[test]
    fn catalog_without_fallback_hard_denies() {
        let catalog = MenuCatalog::from_toml(
            r#"
            [[items]]
            key = "pos"
            label = "Point of Sale"
            route = "/pos"
            "#,
        )
        .unwrap();
        let gate = MenuGate::new(Arc::new(catalog));
        let subject = standard(&[]);

        assert_eq!(
            gate.evaluate(Some(&subject), "pos", false),
            Decision::DenyForbidden {
                message: ACCESS_DENIED_MESSAGE.to_string(),
            }
        );
    }

    #[test]
    fn admin_bypass_precedes_catalog_lookup() {
        // An empty catalog still lets admins through.
        let catalog = MenuCatalog::from_toml("items = []").unwrap();
        let gate = MenuGate::new(Arc::new(catalog));
        let subject = admin();

        assert_eq!(gate.evaluate(Some(&subject), "anything", false), Decision::Allow);
    }
}
