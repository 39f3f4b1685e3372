//! Integration tests for the tenant pool manager.
//!
//! These run against an in-memory registry double so the full
//! lookup/create/cache/shutdown flow is exercised without a database.
//! Pools are constructed lazily, so no connection is ever opened.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use schemapool::{PgConfig, TenancyError, TenancyResult, TenantId, TenantManager, TenantRegistry};

/// Registry double with call-count instrumentation.
struct StaticRegistry {
    tenants: parking_lot::Mutex<HashSet<String>>,
    lookups: AtomicUsize,
    lookup_delay: Duration,
    fail_lookups: AtomicUsize,
}

impl StaticRegistry {
    fn with_tenants(tenants: &[&str]) -> Arc<Self> {
        Self::with_delay(tenants, Duration::ZERO)
    }

    fn with_delay(tenants: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            tenants: parking_lot::Mutex::new(
                tenants.iter().map(|t| t.to_string()).collect(),
            ),
            lookups: AtomicUsize::new(0),
            lookup_delay: delay,
            fail_lookups: AtomicUsize::new(0),
        })
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make the next `n` lookups fail as unavailable.
    fn fail_next(&self, n: usize) {
        self.fail_lookups.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl TenantRegistry for StaticRegistry {
    async fn exists(&self, tenant: &TenantId) -> TenancyResult<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        let remaining = self.fail_lookups.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_lookups.store(remaining - 1, Ordering::SeqCst);
            return Err(TenancyError::RegistryUnavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(self.tenants.lock().contains(tenant.as_str()))
    }

    async fn create(&self, tenant: &TenantId, _name: &str) -> TenancyResult<()> {
        self.tenants.lock().insert(tenant.as_str().to_string());
        Ok(())
    }
}

fn manager_with(registry: Arc<StaticRegistry>) -> TenantManager {
    let config = PgConfig::new("localhost", 5432, "postgres", None, "billing_test");
    TenantManager::builder()
        .config(config)
        .registry(registry)
        .build()
        .expect("manager builds from explicit config")
}

#[tokio::test]
async fn known_tenant_pool_is_cached_after_first_access() {
    let registry = StaticRegistry::with_tenants(&["acme"]);
    let manager = manager_with(registry.clone());

    let tenant = TenantId::new("acme").unwrap();
    let first = manager.get_or_create(&tenant).await.unwrap();
    let second = manager.get_or_create(&tenant).await.unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(registry.lookups(), 1, "cache hit must not touch the registry");
    assert_eq!(manager.cached_tenants(), 1);
}

#[tokio::test]
async fn unknown_tenant_fails_and_caches_nothing() {
    let registry = StaticRegistry::with_tenants(&["acme"]);
    let manager = manager_with(registry.clone());

    let ghost = TenantId::new("ghost").unwrap();
    let err = manager.get_or_create(&ghost).await.unwrap_err();

    assert!(matches!(err, TenancyError::TenantNotFound(ref id) if id == "ghost"));
    assert_eq!(registry.lookups(), 1);
    assert_eq!(manager.cached_tenants(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_access_yields_one_pool() {
    let registry = StaticRegistry::with_delay(&["acme"], Duration::from_millis(20));
    let manager = Arc::new(manager_with(registry.clone()));

    let tenant = TenantId::new("acme").unwrap();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            manager.get_or_create(&tenant).await.unwrap().id()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(registry.lookups(), 1, "losers must share the winner's creation");
    assert_eq!(manager.cached_tenants(), 1);
}

#[tokio::test]
async fn distinct_tenants_get_distinct_pools() {
    let registry = StaticRegistry::with_tenants(&["acme", "globex"]);
    let manager = manager_with(registry.clone());

    let acme = manager
        .get_or_create(&TenantId::new("acme").unwrap())
        .await
        .unwrap();
    let globex = manager
        .get_or_create(&TenantId::new("globex").unwrap())
        .await
        .unwrap();

    assert_ne!(acme.id(), globex.id());
    assert_eq!(manager.cached_tenants(), 2);
}

#[tokio::test]
async fn registry_outage_is_retryable_and_caches_nothing() {
    let registry = StaticRegistry::with_tenants(&["acme"]);
    let manager = manager_with(registry.clone());

    registry.fail_next(1);
    let tenant = TenantId::new("acme").unwrap();
    let err = manager.get_or_create(&tenant).await.unwrap_err();
    assert!(matches!(err, TenancyError::RegistryUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(manager.cached_tenants(), 0);

    // The outage was transient; a retry succeeds.
    manager.get_or_create(&tenant).await.unwrap();
    assert_eq!(manager.cached_tenants(), 1);
    assert_eq!(registry.lookups(), 2);
}

#[tokio::test]
async fn close_all_with_nothing_initialized_is_a_noop() {
    let registry = StaticRegistry::with_tenants(&[]);
    let manager = manager_with(registry);

    manager.close_all();
    assert_eq!(manager.cached_tenants(), 0);
    assert!(!manager.global().is_initialized());
}

#[tokio::test]
async fn close_all_empties_cache_and_forces_fresh_validation() {
    let registry = StaticRegistry::with_tenants(&["acme"]);
    let manager = manager_with(registry.clone());
    manager.init().unwrap();

    let tenant = TenantId::new("acme").unwrap();
    manager.get_or_create(&tenant).await.unwrap();
    assert_eq!(manager.cached_tenants(), 1);

    manager.close_all();
    assert_eq!(manager.cached_tenants(), 0);
    assert!(!manager.global().is_initialized());

    // A previously-cached tenant is validated from scratch.
    manager.get_or_create(&tenant).await.unwrap();
    assert_eq!(registry.lookups(), 2);
    assert_eq!(manager.cached_tenants(), 1);
}

#[tokio::test]
async fn provisioned_tenant_becomes_resolvable() {
    let registry = StaticRegistry::with_tenants(&[]);
    let manager = manager_with(registry.clone());

    let tenant = TenantId::new("initech").unwrap();
    let err = manager.get_or_create(&tenant).await.unwrap_err();
    assert!(err.is_not_found());

    manager.create_tenant(&tenant, "Initech Inc").await.unwrap();
    manager.get_or_create(&tenant).await.unwrap();
    assert_eq!(manager.cached_tenants(), 1);
}
