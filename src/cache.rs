//! The tenant pool cache.
//!
//! Maps tenant ids to their dedicated pools. First access for a tenant runs
//! the caller-supplied creation future under a per-tenant gate, so
//! concurrent first accesses share one creation instead of racing a
//! check-then-create sequence and leaking the losing pool.
//!
//! Retention is unbounded: one entry per distinct tenant ever seen, until
//! `close_all`. There is no idle eviction.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::TenancyResult;
use crate::pool::TenantPool;
use crate::tenant::TenantId;

type Gate = std::sync::Arc<tokio::sync::Mutex<()>>;

pub(crate) struct TenantPoolCache {
    /// Ready pools. Never holds a pool that failed creation.
    pools: RwLock<HashMap<TenantId, TenantPool>>,
    /// Per-tenant creation gates. Gates are retained alongside the pools
    /// so that a late waiter and a fresh caller can never run two
    /// creations for the same tenant concurrently.
    gates: Mutex<HashMap<TenantId, Gate>>,
}

impl TenantPoolCache {
    pub(crate) fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Fast path: return the cached pool without any I/O.
    pub(crate) fn get(&self, tenant: &TenantId) -> Option<TenantPool> {
        self.pools.read().get(tenant).cloned()
    }

    /// Return the cached pool for `tenant`, creating it with `create` on a
    /// miss. Concurrent callers for the same tenant serialize on a per-key
    /// gate; losers observe the winner's pool and never run `create`. A
    /// failed creation caches nothing.
    pub(crate) async fn get_or_create<F, Fut>(
        &self,
        tenant: &TenantId,
        create: F,
    ) -> TenancyResult<TenantPool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TenancyResult<TenantPool>>,
    {
        if let Some(pool) = self.get(tenant) {
            debug!(tenant = %tenant, "using cached tenant pool");
            return Ok(pool);
        }

        let gate = {
            let mut gates = self.gates.lock();
            gates.entry(tenant.clone()).or_default().clone()
        };
        let _guard = gate.lock().await;

        // Re-check under the gate: a concurrent caller may have won.
        if let Some(pool) = self.get(tenant) {
            debug!(tenant = %tenant, "tenant pool created by concurrent caller");
            return Ok(pool);
        }

        let pool = create().await?;
        self.pools.write().insert(tenant.clone(), pool.clone());
        Ok(pool)
    }

    /// Number of cached pools.
    pub(crate) fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// Close every cached pool and clear the cache.
    pub(crate) fn close_all(&self) {
        let drained: Vec<(TenantId, TenantPool)> = self.pools.write().drain().collect();
        let count = drained.len();
        for (tenant, pool) in drained {
            debug!(tenant = %tenant, "closing tenant pool");
            pool.close();
        }
        self.gates.lock().clear();
        if count > 0 {
            info!(count, "all tenant pools closed and cache cleared");
        }
    }
}
