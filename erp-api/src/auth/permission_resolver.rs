//! Role → permission lookups with a bounded in-process cache.
//!
//! A role grants exactly the permissions joined to it through
//! `role_permissions`, unless its `grants_all_permissions` flag is set.
//! Entries expire after the configured TTL so that writes made by other
//! processes converge; writes made through this process call
//! [`PermissionResolver::invalidate`] before they respond.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::config::AuthConfig;
use super::error::AuthError;
use crate::orm::permission::{RoleGrantRecord, load_role_grant};
use crate::orm::{DbRunner, run_store};

/// Everything a role allows, as resolved from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role_id: i32,
    pub role_name: String,
    /// Set only by the role's explicit wildcard flag.
    pub all_permissions: bool,
    pub permissions: BTreeSet<String>,
}

impl RoleGrant {
    pub fn allows(&self, permission: &str) -> bool {
        self.all_permissions || self.permissions.contains(permission)
    }
}

impl From<RoleGrantRecord> for RoleGrant {
    fn from(record: RoleGrantRecord) -> Self {
        RoleGrant {
            role_id: record.role_id,
            role_name: record.role_name,
            all_permissions: record.grants_all,
            permissions: record.permissions,
        }
    }
}

struct CachedGrant {
    grant: Arc<RoleGrant>,
    loaded_at: Instant,
}

pub struct PermissionResolver {
    cache: RwLock<HashMap<i32, CachedGrant>>,
    ttl: Duration,
    capacity: usize,
    store_timeout: Duration,
    /// Bumped by every invalidation. A load that started before an
    /// invalidation must not repopulate the cache with what it read.
    generation: AtomicU64,
}

impl PermissionResolver {
    pub fn new(config: &AuthConfig) -> Self {
        PermissionResolver::with_limits(
            config.permission_cache_ttl(),
            config.permission_cache_capacity,
            config.store_timeout(),
        )
    }

    pub fn with_limits(ttl: Duration, capacity: usize, store_timeout: Duration) -> Self {
        PermissionResolver {
            cache: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
            store_timeout,
            generation: AtomicU64::new(0),
        }
    }

    /// The grant of `role_id`, or `None` if the role does not exist.
    pub async fn grant_for_role<D: DbRunner>(
        &self,
        db: &D,
        role_id: i32,
    ) -> Result<Option<Arc<RoleGrant>>, AuthError> {
        if let Some(grant) = self.cached(role_id) {
            return Ok(Some(grant));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = run_store(db, self.store_timeout, move |conn| {
            load_role_grant(conn, role_id)
        })
        .await?;

        let grant = match loaded {
            Some(record) => Arc::new(RoleGrant::from(record)),
            None => return Ok(None),
        };
        self.store(role_id, grant.clone(), generation);
        Ok(Some(grant))
    }

    /// Names granted to `role_id`. Empty for an unknown role.
    pub async fn permissions_for_role<D: DbRunner>(
        &self,
        db: &D,
        role_id: i32,
    ) -> Result<BTreeSet<String>, AuthError> {
        Ok(self
            .grant_for_role(db, role_id)
            .await?
            .map(|grant| grant.permissions.clone())
            .unwrap_or_default())
    }

    /// A missing role never has a permission.
    pub async fn has_permission<D: DbRunner>(
        &self,
        db: &D,
        role_id: Option<i32>,
        permission: &str,
    ) -> Result<bool, AuthError> {
        let Some(role_id) = role_id else {
            return Ok(false);
        };
        Ok(self
            .grant_for_role(db, role_id)
            .await?
            .is_some_and(|grant| grant.allows(permission)))
    }

    pub async fn has_role<D: DbRunner>(
        &self,
        db: &D,
        role_id: Option<i32>,
        role_name: &str,
    ) -> Result<bool, AuthError> {
        let Some(role_id) = role_id else {
            return Ok(false);
        };
        Ok(self
            .grant_for_role(db, role_id)
            .await?
            .is_some_and(|grant| grant.role_name == role_name))
    }

    pub fn invalidate(&self, role_id: i32) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.remove(&role_id);
        debug!("Permission cache invalidated for role {}", role_id);
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.clear();
        debug!("Permission cache cleared");
    }

    fn cached(&self, role_id: i32) -> Option<Arc<RoleGrant>> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache
            .get(&role_id)
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| entry.grant.clone())
    }

    fn store(&self, role_id: i32, grant: Arc<RoleGrant>, generation: u64) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }

        if cache.len() >= self.capacity && !cache.contains_key(&role_id) {
            let ttl = self.ttl;
            cache.retain(|_, entry| entry.loaded_at.elapsed() < ttl);
        }
        if cache.len() >= self.capacity && !cache.contains_key(&role_id) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, entry)| entry.loaded_at)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                cache.remove(&oldest);
            }
        }

        cache.insert(
            role_id,
            CachedGrant {
                grant,
                loaded_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    fn cached_roles(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
