//! The process-wide pool for the shared (public) schema.
//!
//! Holds zero or one live pool to the shared database. The registry lookup
//! path and any cross-tenant queries go through this pool; tenant-scoped
//! queries never do.

use std::sync::atomic::{AtomicU64, Ordering};

use deadpool_postgres::{Object, Pool};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{PgConfig, PoolConfig};
use crate::error::{TenancyError, TenancyResult, map_pool_error};
use crate::pool::build_pool;

/// Lazily-initialized singleton pool to the shared database.
///
/// `init` is idempotent and safe under concurrency: all callers observe the
/// same pool. `shutdown` returns the manager to the uninitialized state; a
/// subsequent `init` recreates the pool cleanly rather than silently
/// no-oping, and the generation counter records how often that happened.
pub struct GlobalPool {
    config: PgConfig,
    pool_config: PoolConfig,
    slot: Mutex<Option<Pool>>,
    generation: AtomicU64,
}

impl GlobalPool {
    pub(crate) fn new(config: PgConfig, pool_config: PoolConfig) -> Self {
        Self {
            config,
            pool_config,
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Initialize the pool if it does not exist yet, returning a handle.
    ///
    /// Pool construction is synchronous and lazy (no connection is opened),
    /// so the slot lock is never held across an await point.
    pub fn init(&self) -> TenancyResult<Pool> {
        let mut slot = self.slot.lock();
        if let Some(pool) = slot.as_ref() {
            debug!("global pool already initialized");
            return Ok(pool.clone());
        }

        let pool = build_pool(&self.config, &self.pool_config, None)?;
        *slot = Some(pool.clone());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            generation,
            "global connection pool created"
        );
        Ok(pool)
    }

    /// Get the current pool, failing if `init` was never called.
    pub fn get(&self) -> TenancyResult<Pool> {
        self.slot
            .lock()
            .as_ref()
            .cloned()
            .ok_or(TenancyError::NotInitialized)
    }

    /// Acquire a connection to the shared schema.
    ///
    /// The connection is released back to the pool when dropped.
    pub async fn acquire(&self) -> TenancyResult<Object> {
        let pool = self.get()?;
        pool.get().await.map_err(map_pool_error)
    }

    /// Close the pool and return to the uninitialized state.
    ///
    /// A no-op when nothing was initialized.
    pub fn shutdown(&self) {
        if let Some(pool) = self.slot.lock().take() {
            pool.close();
            info!("global connection pool closed");
        }
    }

    /// Whether a live pool exists.
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Number of times a pool has been created over this manager's lifetime.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}
