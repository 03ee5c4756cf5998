//! tenantctl core library
//!
//! Multi-tenant provisioning on a Kubernetes cluster: tenants are granted
//! targets (single nodes or labelled node groups) and receive an isolated,
//! quota-limited namespace on each target they instantiate.

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod lifecycle;
pub mod logging;
pub mod tenancy;

pub use config::TenantctlConfig;
pub use error::{TenancyError, TenancyResult};
pub use kubernetes::{ClusterGateway, ObjectKind, ObjectRef};
pub use lifecycle::LifecycleOrchestrator;
pub use tenancy::{AccessGrantStore, DefaultTargetResolver, TargetCatalog, TenantContext};

use std::sync::Arc;

use kubernetes::client::K8sClient;
use kubernetes::gateway::KubeGateway;

/// Catalog, grant store, resolver and orchestrator over one gateway
#[derive(Clone)]
pub struct TenancyServices {
    pub catalog: TargetCatalog,
    pub grants: AccessGrantStore,
    pub resolver: DefaultTargetResolver,
    pub lifecycle: LifecycleOrchestrator,
}

impl TenancyServices {
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: &TenantctlConfig) -> Self {
        let tenant_namespace = config.cluster.tenant_namespace.clone();

        let catalog = TargetCatalog::new(gateway.clone(), tenant_namespace.clone());
        let grants = AccessGrantStore::new(
            gateway.clone(),
            catalog.clone(),
            tenant_namespace.clone(),
            config.lifecycle.conflict_retries,
        );
        let resolver = DefaultTargetResolver::new(grants.clone(), gateway.caller_namespace());
        let lifecycle = LifecycleOrchestrator::new(
            gateway,
            grants.clone(),
            tenant_namespace,
            config.lifecycle.clone(),
        )
        .with_default_quota(config.defaults.quota.clone());

        Self {
            catalog,
            grants,
            resolver,
            lifecycle,
        }
    }

    /// Connect to the cluster named by the configuration
    pub async fn connect(config: &TenantctlConfig) -> TenancyResult<Self> {
        let client = K8sClient::connect(
            config.cluster.kubeconfig.as_deref(),
            config.cluster.context.as_deref(),
        )
        .await?;
        tracing::info!(
            api_server = %client.api_server(),
            context = ?client.context(),
            "Connected to cluster"
        );

        let gateway: Arc<dyn ClusterGateway> = Arc::new(KubeGateway::new(client));
        Ok(Self::new(gateway, config))
    }
}
