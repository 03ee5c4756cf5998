//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use tenantctl_core::kubernetes::memory::InMemoryGateway;
use tenantctl_core::kubernetes::{ClusterGateway, ClusterObject, GatewayResult};
use tenantctl_core::{ObjectKind, ObjectRef, TenancyServices, TenantctlConfig};

pub const TENANT_NAMESPACE: &str = "default";

/// Configuration with short polling intervals
pub fn test_config() -> TenantctlConfig {
    let mut config = TenantctlConfig::default();
    config.cluster.tenant_namespace = TENANT_NAMESPACE.to_string();
    config.lifecycle.deletion_poll_interval_ms = 5;
    config.lifecycle.deletion_timeout_secs = 5;
    config.lifecycle.readiness_attempts = 3;
    config.lifecycle.readiness_interval_ms = 5;
    config
}

/// Cluster with nodes `n1` and `n2`; `n2` is in group `gpu`
pub fn create_test_cluster() -> Arc<InMemoryGateway> {
    let gateway = InMemoryGateway::new();
    gateway.add_node("n1", &[("kubernetes.io/hostname", "n1")]);
    gateway.add_node(
        "n2",
        &[("kubernetes.io/hostname", "n2"), ("tenantctl.group/gpu", "true")],
    );
    Arc::new(gateway)
}

pub fn services(gateway: &Arc<InMemoryGateway>) -> TenancyServices {
    services_with(gateway, test_config())
}

pub fn services_with(gateway: &Arc<InMemoryGateway>, config: TenantctlConfig) -> TenancyServices {
    TenancyServices::new(gateway.clone(), &config)
}

/// Gateway that hands control back to the scheduler before every call,
/// the way a request to a real API server would
pub struct YieldingGateway {
    inner: Arc<InMemoryGateway>,
}

impl YieldingGateway {
    pub fn new(inner: Arc<InMemoryGateway>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ClusterGateway for YieldingGateway {
    async fn get(&self, object: &ObjectRef) -> GatewayResult<ClusterObject> {
        tokio::task::yield_now().await;
        self.inner.get(object).await
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> GatewayResult<Vec<ClusterObject>> {
        tokio::task::yield_now().await;
        self.inner.list(kind, namespace, label_selector).await
    }

    async fn create(&self, object: ClusterObject) -> GatewayResult<ClusterObject> {
        tokio::task::yield_now().await;
        self.inner.create(object).await
    }

    async fn replace(&self, object: ClusterObject) -> GatewayResult<ClusterObject> {
        tokio::task::yield_now().await;
        self.inner.replace(object).await
    }

    async fn delete(&self, object: &ObjectRef) -> GatewayResult<()> {
        tokio::task::yield_now().await;
        self.inner.delete(object).await
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        tail_lines: Option<i64>,
    ) -> GatewayResult<String> {
        tokio::task::yield_now().await;
        self.inner.pod_logs(namespace, name, tail_lines).await
    }

    fn caller_namespace(&self) -> Option<String> {
        self.inner.caller_namespace()
    }
}

/// Services over `gateway` with every call yielding first
pub fn yielding_services(gateway: &Arc<InMemoryGateway>) -> TenancyServices {
    TenancyServices::new(
        Arc::new(YieldingGateway::new(gateway.clone())),
        &test_config(),
    )
}

/// Add nodes `w1..=wN`, each its own node target
pub fn add_worker_nodes(gateway: &InMemoryGateway, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| {
            let name = format!("w{}", i);
            gateway.add_node(&name, &[("kubernetes.io/hostname", name.as_str())]);
            name
        })
        .collect()
}

pub fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Create `tenant`, grant `targets` and instantiate each of them
pub async fn tenant_with_targets(services: &TenancyServices, tenant: &str, targets: &[&str]) {
    services
        .lifecycle
        .create_tenant(tenant)
        .await
        .expect("Failed to create tenant");

    for target in targets {
        services
            .grants
            .grant_target(tenant, target)
            .await
            .expect("Failed to grant target");
        services
            .lifecycle
            .create_tenant_target(tenant, target, None)
            .await
            .expect("Failed to create tenant-target");
    }
}
