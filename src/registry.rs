//! Tenant registry lookups against the shared `tenants` table.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{TenancyError, TenancyResult};
use crate::global::GlobalPool;
use crate::tenant::TenantId;

/// Source of truth for which tenants exist.
///
/// The pool cache consults this before constructing a tenant pool. The
/// SQL-backed implementation is the default; tests and alternative
/// deployments can inject their own.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Whether the tenant has a row in the registry.
    async fn exists(&self, tenant: &TenantId) -> TenancyResult<bool>;

    /// Provision a new tenant (registry row plus private schema).
    async fn create(&self, tenant: &TenantId, name: &str) -> TenancyResult<()>;
}

/// Registry backed by the shared `tenants` table, queried through the
/// global pool.
pub struct SqlRegistry {
    global: Arc<GlobalPool>,
}

impl SqlRegistry {
    pub fn new(global: Arc<GlobalPool>) -> Self {
        Self { global }
    }
}

#[async_trait]
impl TenantRegistry for SqlRegistry {
    async fn exists(&self, tenant: &TenantId) -> TenancyResult<bool> {
        // NotInitialized propagates as-is; transport and query failures are
        // registry unavailability, which callers may retry.
        let pool = self.global.get()?;
        let client = pool
            .get()
            .await
            .map_err(|e| TenancyError::RegistryUnavailable(e.to_string()))?;

        debug!(tenant = %tenant, "checking tenant registry");
        let row = client
            .query_opt("SELECT 1 FROM tenants WHERE id = $1", &[&tenant.as_str()])
            .await
            .map_err(|e| TenancyError::RegistryUnavailable(e.to_string()))?;

        // The client drops here, releasing the connection back to the
        // global pool on every path.
        Ok(row.is_some())
    }

    async fn create(&self, tenant: &TenantId, name: &str) -> TenancyResult<()> {
        let pool = self.global.get()?;
        let mut client = pool
            .get()
            .await
            .map_err(|e| TenancyError::RegistryUnavailable(e.to_string()))?;

        // The create_tenant() database function inserts the registry row
        // and creates the tenant schema; keep both inside one transaction.
        let txn = client.transaction().await?;
        txn.execute("SELECT create_tenant($1, $2)", &[&tenant.as_str(), &name])
            .await?;
        txn.commit().await?;

        info!(tenant = %tenant, name = %name, "tenant provisioned");
        Ok(())
    }
}
