//! Grant resolution service with DashMap-based caching.
//!
//! Turns a stored user row into the [`Role`] the gate evaluates: admins get
//! [`Role::Admin`] directly, everyone else gets the union of their own grant
//! column and their assigned role's grant set. Resolved sets are cached per
//! user until a permission write invalidates them.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::{Role, Subject};
use crate::menu::MenuCatalog;
use crate::models;
use crate::models::User;

/// Grant cache entry.
#[derive(Debug, Clone)]
struct CachedGrants {
    keys: HashSet<String>,
}

/// Grant resolution with fast DashMap-based lookups.
#[derive(Clone)]
pub struct PermissionService {
    inner: Arc<PermissionServiceInner>,
}

struct PermissionServiceInner {
    /// Cache of user_id -> resolved grant keys.
    user_cache: DashMap<Uuid, CachedGrants>,

    /// Database pool for cache misses.
    pool: PgPool,
}

impl PermissionService {
    /// Create a new permission service.
    pub fn new(pool: PgPool) -> Self {
        Self {
            inner: Arc::new(PermissionServiceInner {
                user_cache: DashMap::new(),
                pool,
            }),
        }
    }

    /// Resolve a user's authorization role.
    ///
    /// - Admin users become [`Role::Admin`] without touching the cache or
    ///   the database.
    /// - Everyone else gets `Standard` with the union of their own grant
    ///   column and their assigned role's grant set.
    pub async fn resolve_role(&self, user: &User) -> Result<Role> {
        if user.is_admin {
            return Ok(Role::Admin);
        }

        // Check cache first
        if let Some(cached) = self.inner.user_cache.get(&user.id) {
            return Ok(Role::Standard(cached.keys.clone()));
        }

        // Cache miss - load from database
        let keys = self.load_grants(user).await?;
        self.inner
            .user_cache
            .insert(user.id, CachedGrants { keys: keys.clone() });

        Ok(Role::Standard(keys))
    }

    /// Resolve the full subject handed to the gate.
    pub async fn subject_for(&self, user: &User) -> Result<Subject> {
        let role = self.resolve_role(user).await?;
        Ok(Subject {
            user_id: user.id,
            role,
        })
    }

    /// Load and merge a user's grant sources from the database.
    async fn load_grants(&self, user: &User) -> Result<HashSet<String>> {
        let role_keys = match user.role_id {
            Some(role_id) => models::Role::find_by_id(&self.inner.pool, role_id)
                .await?
                .map(|role| role.grant_keys().to_vec()),
            None => None,
        };

        Ok(merge_grants(user.own_grants(), role_keys.as_deref()))
    }

    /// Invalidate the cache for a specific user.
    ///
    /// Call this when a user's grants or role assignment change.
    pub fn invalidate_user(&self, user_id: Uuid) {
        self.inner.user_cache.remove(&user_id);
    }

    /// Invalidate the entire cache.
    ///
    /// Call this when a role's grant set changes; any number of users may
    /// inherit from it.
    pub fn invalidate_all(&self) {
        self.inner.user_cache.clear();
    }

    /// Get the number of cached entries (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.inner.user_cache.len()
    }
}

/// Union of a user's own grant keys and their assigned role's keys.
fn merge_grants(own: &[String], role: Option<&[String]>) -> HashSet<String> {
    let mut keys: HashSet<String> = own.iter().cloned().collect();
    if let Some(role_keys) = role {
        keys.extend(role_keys.iter().cloned());
    }
    keys
}

/// Grant keys a brand-new account starts with.
///
/// Standard accounts receive the catalog's baseline set, applied exactly
/// once at creation. Admin accounts carry no grant keys; the admin role
/// bypasses them.
pub fn initial_permissions(is_admin: bool, catalog: &MenuCatalog) -> Vec<String> {
    if is_admin {
        Vec::new()
    } else {
        catalog.default_permissions().to_vec()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|k| (*k).to_string()).collect()
    }

    #[test]
    fn merge_is_union_of_both_sources() {
        let own = keys(&["dashboard", "pos"]);
        let role = keys(&["pos", "reports"]);

        let merged = merge_grants(&own, Some(&role));

        assert_eq!(merged.len(), 3);
        assert!(merged.contains("dashboard"));
        assert!(merged.contains("pos"));
        assert!(merged.contains("reports"));
    }

    #[test]
    fn merge_without_role_keeps_own_grants() {
        let own = keys(&["dashboard"]);

        let merged = merge_grants(&own, None);

        assert_eq!(merged, HashSet::from(["dashboard".to_string()]));
    }

    #[test]
    fn merge_of_empty_sources_is_empty() {
        assert!(merge_grants(&[], None).is_empty());
        assert!(merge_grants(&[], Some(&[])).is_empty());
    }

    #[test]
    fn new_standard_accounts_start_with_the_catalog_defaults() {
        let catalog = MenuCatalog::builtin().unwrap();

        assert_eq!(initial_permissions(false, &catalog), ["dashboard", "pos"]);
    }

    #[test]
    fn new_admin_accounts_start_with_no_grants() {
        let catalog = MenuCatalog::builtin().unwrap();

        assert!(initial_permissions(true, &catalog).is_empty());
    }
}
