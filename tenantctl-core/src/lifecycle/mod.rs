//! Lifecycle orchestration
//!
//! Drives the multi-object create and delete sequences for tenants,
//! tenant-targets, pods, secrets and target groups. Deletions of several
//! names fan out concurrently and every deletion waits for convergence.

pub mod convergence;
pub mod fanout;
mod target_group;
mod tenant;
mod tenant_target;
mod workload;

pub use convergence::{Convergence, DeletionState, MissingObject};
pub use fanout::{CascadePolicy, FailurePolicy, FanOutReport, TaskGroup, UnitOutcome};
pub use tenant::{identity_to_info, TenantDeletion};
pub use tenant_target::PolicyChange;

use std::sync::Arc;
use tenantctl_common::QuotaSpec;

use crate::config::LifecycleConfig;
use crate::kubernetes::ClusterGateway;
use crate::tenancy::{AccessGrantStore, TargetCatalog};

/// Creates and tears down tenant objects
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    gateway: Arc<dyn ClusterGateway>,
    grants: AccessGrantStore,
    tenant_namespace: String,
    settings: LifecycleConfig,
    default_quota: QuotaSpec,
}

impl LifecycleOrchestrator {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        grants: AccessGrantStore,
        tenant_namespace: impl Into<String>,
        settings: LifecycleConfig,
    ) -> Self {
        Self {
            gateway,
            grants,
            tenant_namespace: tenant_namespace.into(),
            settings,
            default_quota: QuotaSpec::default(),
        }
    }

    /// Quota used when creating a tenant-target without an explicit one
    pub fn with_default_quota(mut self, quota: QuotaSpec) -> Self {
        self.default_quota = quota;
        self
    }

    pub fn grants(&self) -> &AccessGrantStore {
        &self.grants
    }

    pub fn catalog(&self) -> &TargetCatalog {
        self.grants.catalog()
    }

    pub fn default_quota(&self) -> &QuotaSpec {
        &self.default_quota
    }

    pub fn settings(&self) -> &LifecycleConfig {
        &self.settings
    }

    fn convergence(&self) -> Convergence {
        Convergence::new(
            self.settings.deletion_poll_interval(),
            self.settings.deletion_timeout(),
        )
    }

    fn task_group(&self) -> TaskGroup {
        TaskGroup::new().with_deadline(self.settings.fanout_deadline())
    }

    fn policy(&self) -> CascadePolicy {
        self.settings.cascade_policy()
    }
}
