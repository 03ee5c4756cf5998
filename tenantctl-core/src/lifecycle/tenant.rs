//! Tenant lifecycle
//!
//! A tenant is an identity (ServiceAccount) in the tenant namespace plus a
//! default role and role binding. Deleting a tenant cascades through its
//! tenant-targets first.

use k8s_openapi::api::core::v1::ServiceAccount;
use serde::{Deserialize, Serialize};
use tenantctl_common::labels::{self, GrantTable};
use tenantctl_common::naming;
use tracing::{debug, info, instrument, warn};

use super::fanout::FanOutReport;
use super::LifecycleOrchestrator;
use crate::error::{TenancyError, TenancyResult};
use crate::kubernetes::objects;
use crate::kubernetes::types::{Readiness, TenantInfo};
use crate::kubernetes::{list_typed, ClusterObject, ObjectKind, ObjectRef};
use crate::tenancy::{fetch_identity, identity_ref};

/// Outcome of deleting one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDeletion {
    pub tenant: String,
    /// One entry per tenant-target that was torn down first
    pub targets: FanOutReport,
    /// Why the tenant's own objects were not (fully) deleted
    pub error: Option<String>,
}

impl TenantDeletion {
    fn failed(tenant: &str, targets: FanOutReport, error: impl ToString) -> Self {
        Self {
            tenant: tenant.to_string(),
            targets,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.targets.is_success()
    }

    /// Every failure message, tenant-targets first
    pub fn failures(&self) -> Vec<String> {
        self.targets
            .failures()
            .filter_map(|outcome| outcome.error.clone())
            .chain(self.error.clone())
            .collect()
    }
}

/// Summarize an identity object, `None` if it carries no tenant label
pub fn identity_to_info(identity: ServiceAccount) -> Option<TenantInfo> {
    let identity_labels = identity.metadata.labels.unwrap_or_default();
    let name = identity_labels.get(labels::TENANT)?.clone();

    Some(TenantInfo {
        grants: GrantTable::from_labels(&identity_labels).rows(&name),
        default_target: labels::default_target(&identity_labels).map(String::from),
        credentials_ready: identity.secrets.is_some_and(|s| !s.is_empty()),
        name,
    })
}

impl LifecycleOrchestrator {
    /// Create a tenant and wait for its credentials
    ///
    /// Running out of readiness attempts is not an error: the tenant exists
    /// and `Readiness::NotReady` is returned.
    #[instrument(skip(self))]
    pub async fn create_tenant(&self, tenant: &str) -> TenancyResult<Readiness> {
        naming::validate_tenant_name(tenant)?;
        let namespace = &self.tenant_namespace;

        let sequence: Vec<ClusterObject> = vec![
            objects::tenant_identity(tenant, namespace).into(),
            objects::tenant_default_role(tenant, namespace).into(),
            objects::tenant_default_role_binding(tenant, namespace).into(),
        ];
        for object in sequence {
            debug!(object = %object.object_ref(), "Creating tenant object");
            self.gateway.create(object).await?;
        }
        info!(tenant = %tenant, "Tenant created");

        self.await_credentials(tenant).await
    }

    /// Poll the identity until it has been issued a credential
    pub async fn await_credentials(&self, tenant: &str) -> TenancyResult<Readiness> {
        let attempts = self.settings.readiness_attempts;
        let interval = self.settings.readiness_interval();

        for attempt in 1..=attempts {
            let identity =
                fetch_identity(self.gateway.as_ref(), &self.tenant_namespace, tenant).await?;
            if identity.secrets.as_ref().is_some_and(|s| !s.is_empty()) {
                debug!(tenant = %tenant, attempt, "Credentials issued");
                return Ok(Readiness::Ready);
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!(tenant = %tenant, attempts, "Credentials not issued in time");
        Ok(Readiness::NotReady { attempts })
    }

    pub async fn get_tenant(&self, tenant: &str) -> TenancyResult<TenantInfo> {
        let identity = fetch_identity(self.gateway.as_ref(), &self.tenant_namespace, tenant).await?;
        identity_to_info(identity).ok_or_else(|| {
            TenancyError::validation(format!(
                "identity of '{}' carries no tenant label",
                tenant
            ))
        })
    }

    pub async fn list_tenants(&self) -> TenancyResult<Vec<TenantInfo>> {
        let identities: Vec<ServiceAccount> = list_typed(
            self.gateway.as_ref(),
            ObjectKind::ServiceAccount,
            Some(&self.tenant_namespace),
            Some(labels::TENANT),
        )
        .await?;

        Ok(identities.into_iter().filter_map(identity_to_info).collect())
    }

    /// Delete tenants one after another, each with its tenant-targets
    #[instrument(skip(self))]
    pub async fn delete_tenants(&self, tenants: &[String]) -> Vec<TenantDeletion> {
        let mut results = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            let deletion = self.delete_tenant(tenant).await;
            match &deletion.error {
                Some(error) => warn!(tenant = %tenant, error = %error, "Tenant deletion failed"),
                None => info!(tenant = %tenant, "Tenant deleted"),
            }
            results.push(deletion);
        }
        results
    }

    async fn delete_tenant(&self, tenant: &str) -> TenantDeletion {
        if let Err(e) = naming::validate_tenant_name(tenant) {
            return TenantDeletion::failed(tenant, FanOutReport::default(), e);
        }

        let targets: Vec<String> = match self.grants.grants(tenant).await {
            Ok(table) => table.targets().into_iter().map(|t| t.name).collect(),
            Err(e) => return TenantDeletion::failed(tenant, FanOutReport::default(), e),
        };

        let report = self.delete_tenant_targets(tenant, &targets).await;
        if !self.policy().parent.proceeds_after(&report) {
            let failed = report.failures().count();
            return TenantDeletion::failed(
                tenant,
                report,
                format!(
                    "tenant '{}' kept: {} tenant-target deletion(s) failed",
                    tenant, failed
                ),
            );
        }

        match self.remove_tenant_objects(tenant).await {
            Ok(()) => TenantDeletion {
                tenant: tenant.to_string(),
                targets: report,
                error: None,
            },
            Err(e) => TenantDeletion::failed(tenant, report, e),
        }
    }

    /// Delete identity, role and binding, stopping at the first failure
    async fn remove_tenant_objects(&self, tenant: &str) -> TenancyResult<()> {
        let namespace = &self.tenant_namespace;
        let sequence = [
            identity_ref(namespace, tenant),
            ObjectRef::namespaced(ObjectKind::Role, namespace, &naming::tenant_default_role(tenant)),
            ObjectRef::namespaced(
                ObjectKind::RoleBinding,
                namespace,
                &naming::tenant_default_role_binding(tenant),
            ),
        ];

        for object in &sequence {
            debug!(object = %object, "Deleting tenant object");
            self.gateway.delete(object).await?;
        }
        Ok(())
    }
}
