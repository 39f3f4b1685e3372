//! The tenant pool manager service.
//!
//! One `TenantManager` per process, injected into request handlers (wrap it
//! in an `Arc`). It owns the only shared mutable state in this crate: the
//! global pool slot and the tenant pool cache.

use std::sync::Arc;

use tracing::debug;

use crate::cache::TenantPoolCache;
use crate::config::{PgConfig, PoolConfig};
use crate::error::{TenancyError, TenancyResult};
use crate::global::GlobalPool;
use crate::pool::TenantPool;
use crate::registry::{SqlRegistry, TenantRegistry};
use crate::tenant::TenantId;

/// Manages the global pool and the per-tenant pool cache.
pub struct TenantManager {
    global: Arc<GlobalPool>,
    registry: Arc<dyn TenantRegistry>,
    cache: TenantPoolCache,
    config: PgConfig,
    pool_config: PoolConfig,
}

impl TenantManager {
    /// Create a manager with default pool sizing and the SQL-backed
    /// registry.
    pub fn new(config: PgConfig) -> Self {
        let pool_config = PoolConfig::default();
        let global = Arc::new(GlobalPool::new(config.clone(), pool_config.clone()));
        let registry: Arc<dyn TenantRegistry> = Arc::new(SqlRegistry::new(global.clone()));
        Self {
            global,
            registry,
            cache: TenantPoolCache::new(),
            config,
            pool_config,
        }
    }

    /// Create a builder for configuring the manager.
    pub fn builder() -> TenantManagerBuilder {
        TenantManagerBuilder::new()
    }

    /// Initialize the global pool. Idempotent; concurrent callers observe
    /// a single pool.
    pub fn init(&self) -> TenancyResult<()> {
        self.global.init().map(|_| ())
    }

    /// The global pool, for shared-schema queries.
    pub fn global(&self) -> &GlobalPool {
        &self.global
    }

    /// Get the pool for `tenant`, creating it on first access.
    ///
    /// The fast path returns the cached pool without I/O. On a miss the
    /// tenant is validated against the registry through the global pool;
    /// unknown tenants fail with [`TenancyError::TenantNotFound`] and
    /// cache nothing. Concurrent first accesses for one tenant share a
    /// single creation.
    pub async fn get_or_create(&self, tenant: &TenantId) -> TenancyResult<TenantPool> {
        self.cache
            .get_or_create(tenant, || async {
                if !self.registry.exists(tenant).await? {
                    return Err(TenancyError::TenantNotFound(tenant.to_string()));
                }
                debug!(tenant = %tenant, "tenant validated, creating pool");
                TenantPool::new(&self.config, &self.pool_config, tenant.clone())
            })
            .await
    }

    /// Provision a new tenant through the registry.
    pub async fn create_tenant(&self, tenant: &TenantId, name: &str) -> TenancyResult<()> {
        self.registry.create(tenant, name).await
    }

    /// Number of tenants with a live pool.
    pub fn cached_tenants(&self) -> usize {
        self.cache.len()
    }

    /// Best-effort shutdown: close every tenant pool, clear the cache and
    /// close the global pool. Safe to call when nothing was initialized;
    /// never fails.
    pub fn close_all(&self) {
        self.cache.close_all();
        self.global.shutdown();
    }
}

/// Builder for [`TenantManager`].
pub struct TenantManagerBuilder {
    url: Option<String>,
    config: Option<PgConfig>,
    pool_config: PoolConfig,
    registry: Option<Arc<dyn TenantRegistry>>,
}

impl TenantManagerBuilder {
    fn new() -> Self {
        Self {
            url: None,
            config: None,
            pool_config: PoolConfig::default(),
            registry: None,
        }
    }

    /// Set the database URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the connection configuration.
    pub fn config(mut self, config: PgConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the pool sizing and timeout configuration.
    pub fn pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    /// Set the maximum number of connections per pool.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.pool_config.max_connections = n;
        self
    }

    /// Replace the SQL-backed registry with a custom implementation.
    pub fn registry(mut self, registry: Arc<dyn TenantRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the manager.
    ///
    /// Connection configuration is resolved in order: explicit config,
    /// database URL, then the environment.
    pub fn build(self) -> TenancyResult<TenantManager> {
        let config = if let Some(config) = self.config {
            config
        } else if let Some(url) = self.url {
            PgConfig::from_url(url)?
        } else {
            PgConfig::from_env()?
        };

        let global = Arc::new(GlobalPool::new(config.clone(), self.pool_config.clone()));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SqlRegistry::new(global.clone())));

        Ok(TenantManager {
            global,
            registry,
            cache: TenantPoolCache::new(),
            config,
            pool_config: self.pool_config,
        })
    }
}
