//! Tenant-scoped connection pools.
//!
//! Every tenant pool connects to the same physical database as the global
//! pool and differs only in its post-create hook, which pins the schema
//! search path of each new physical connection to the tenant's private
//! schema. A hook failure fails the acquisition; callers never receive an
//! unscoped connection.

use deadpool_postgres::{
    ClientWrapper, Hook, HookError, Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime,
};
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PgConfig, PoolConfig};
use crate::error::{TenancyError, TenancyResult, map_pool_error};
use crate::tenant::TenantId;

/// Build a deadpool pool from the base configuration, optionally attaching
/// a post-create hook. Construction is lazy: no connection is opened until
/// the first acquisition.
pub(crate) fn build_pool(
    config: &PgConfig,
    pool_config: &PoolConfig,
    post_create: Option<Hook>,
) -> TenancyResult<Pool> {
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(config.to_pg_config(), NoTls, mgr_config);

    let mut builder = Pool::builder(mgr)
        .runtime(Runtime::Tokio1)
        .max_size(pool_config.max_connections)
        .wait_timeout(Some(pool_config.wait_timeout()))
        .create_timeout(Some(pool_config.create_timeout()))
        .recycle_timeout(Some(pool_config.recycle_timeout()));

    if let Some(hook) = post_create {
        builder = builder.post_create(hook);
    }

    builder
        .build()
        .map_err(|e| TenancyError::config(format!("failed to create pool: {}", e)))
}

/// A connection pool dedicated to a single tenant.
///
/// Constructed only by the pool cache; cheap to clone (all clones share the
/// same underlying pool).
#[derive(Debug, Clone)]
pub struct TenantPool {
    inner: Pool,
    tenant: TenantId,
    id: Uuid,
}

impl TenantPool {
    pub(crate) fn new(
        config: &PgConfig,
        pool_config: &PoolConfig,
        tenant: TenantId,
    ) -> TenancyResult<Self> {
        let search_path = format!("{}, public", tenant.quoted_schema());
        let hook_tenant = tenant.clone();

        let hook = Hook::async_fn(move |client: &mut ClientWrapper, _| {
            let sql = format!("SET search_path TO {}", search_path);
            let tenant = hook_tenant.clone();
            Box::pin(async move {
                debug!(tenant = %tenant, "setting search path on new connection");
                client.simple_query(&sql).await.map_err(|e| {
                    warn!(tenant = %tenant, error = %e, "failed to set search path");
                    HookError::Backend(e)
                })?;
                Ok(())
            })
        });

        let inner = build_pool(config, pool_config, Some(hook))?;
        let id = Uuid::new_v4();

        info!(
            tenant = %tenant,
            pool_id = %id,
            schema = %tenant.schema(),
            max_connections = %pool_config.max_connections,
            "tenant connection pool created"
        );

        Ok(Self { inner, tenant, id })
    }

    /// Acquire a scoped connection from the pool.
    ///
    /// The returned connection already has its search path set to
    /// `tenant_<id>, public` and is released back to the pool on drop.
    pub async fn acquire(&self) -> TenancyResult<ScopedConnection> {
        debug!(tenant = %self.tenant, "acquiring scoped connection");
        let client = self.inner.get().await.map_err(map_pool_error)?;
        Ok(ScopedConnection {
            client,
            tenant: self.tenant.clone(),
        })
    }

    /// The tenant this pool belongs to.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Unique id of this pool instance, for logging and diagnostics.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current pool usage.
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            available: status.available as usize,
            size: status.size as usize,
            max_size: status.max_size as usize,
            waiting: status.waiting,
        }
    }

    /// Close the pool and all of its connections.
    pub fn close(&self) {
        self.inner.close();
        info!(tenant = %self.tenant, pool_id = %self.id, "tenant connection pool closed");
    }
}

/// Pool usage information.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    /// Number of idle connections.
    pub available: usize,
    /// Current total size of the pool.
    pub size: usize,
    /// Maximum size of the pool.
    pub max_size: usize,
    /// Number of tasks waiting for a connection.
    pub waiting: usize,
}

/// A pooled connection whose search path is pinned to a tenant schema.
///
/// Released back to the pool when dropped.
pub struct ScopedConnection {
    client: Object,
    tenant: TenantId,
}

impl ScopedConnection {
    /// Execute a query and return all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> TenancyResult<Vec<tokio_postgres::Row>> {
        debug!(tenant = %self.tenant, sql = %sql, "executing query");
        Ok(self.client.query(sql, params).await?)
    }

    /// Execute a query and return exactly one row.
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> TenancyResult<tokio_postgres::Row> {
        debug!(tenant = %self.tenant, sql = %sql, "executing query_one");
        Ok(self.client.query_one(sql, params).await?)
    }

    /// Execute a query and return zero or one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> TenancyResult<Option<tokio_postgres::Row>> {
        debug!(tenant = %self.tenant, sql = %sql, "executing query_opt");
        Ok(self.client.query_opt(sql, params).await?)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> TenancyResult<u64> {
        debug!(tenant = %self.tenant, sql = %sql, "executing statement");
        Ok(self.client.execute(sql, params).await?)
    }

    /// Execute a batch of statements in a single round-trip.
    pub async fn batch_execute(&self, sql: &str) -> TenancyResult<()> {
        debug!(tenant = %self.tenant, "executing batch");
        Ok(self.client.batch_execute(sql).await?)
    }

    /// The session's current search path, as reported by the server.
    ///
    /// Useful for verifying scoping in integration tests and health checks.
    pub async fn current_search_path(&self) -> TenancyResult<String> {
        let row = self.client.query_one("SHOW search_path", &[]).await?;
        Ok(row.get(0))
    }

    /// The tenant this connection is scoped to.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Get the underlying pooled client for operations not covered here.
    pub fn inner(&self) -> &Object {
        &self.client
    }
}
