//! Error types for tenant pool management.

use thiserror::Error;

/// Result type for tenant pool operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Errors that can occur while managing tenant-scoped pools.
#[derive(Error, Debug)]
pub enum TenancyError {
    /// The global pool was requested before `init()` was called.
    #[error("global pool not initialized; call init() first")]
    NotInitialized,

    /// The tenant id has no row in the tenant registry.
    #[error("tenant '{0}' not found in the tenant registry")]
    TenantNotFound(String),

    /// The tenant registry could not be reached or queried.
    #[error("tenant registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Setting the schema search path on a fresh connection failed.
    #[error("failed to scope connection to tenant schema: {0}")]
    ScopingFailed(String),

    /// Waiting for a pooled connection exceeded the configured timeout.
    #[error("timed out waiting for a pooled connection")]
    PoolExhausted,

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// PostgreSQL error from a query on an already-scoped connection.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl TenancyError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Whether the caller may retry the operation (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RegistryUnavailable(_) | Self::PoolExhausted)
    }

    /// Whether this maps to a client-facing "unknown tenant" response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TenantNotFound(_))
    }
}

/// Map a deadpool acquisition error onto the tenancy taxonomy.
///
/// Post-create hook failures are scoping failures: the pool refused to hand
/// out a connection whose search path could not be set.
pub(crate) fn map_pool_error(err: deadpool_postgres::PoolError) -> TenancyError {
    use deadpool_postgres::PoolError;

    match err {
        PoolError::Timeout(_) => TenancyError::PoolExhausted,
        PoolError::PostCreateHook(hook_err) => TenancyError::ScopingFailed(hook_err.to_string()),
        PoolError::Backend(pg_err) => TenancyError::Connection(pg_err.to_string()),
        other => TenancyError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TenancyError::PoolExhausted.is_retryable());
        assert!(TenancyError::RegistryUnavailable("timeout".into()).is_retryable());
        assert!(!TenancyError::NotInitialized.is_retryable());
        assert!(!TenancyError::TenantNotFound("acme".into()).is_retryable());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(TenancyError::TenantNotFound("ghost".into()).is_not_found());
        assert!(!TenancyError::Config("bad url".into()).is_not_found());
    }

    #[test]
    fn test_error_display_includes_tenant() {
        let err = TenancyError::TenantNotFound("acme".into());
        assert!(err.to_string().contains("acme"));
    }
}
