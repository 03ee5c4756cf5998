//! Tenant-target lifecycle
//!
//! A tenant-target is the namespace `<tenant>-<target>` together with its
//! quota, role, role binding and network policy.

use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::Role;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use tenantctl_common::{labels, naming, QuotaSpec, QuotaUpdate, Target};
use tracing::{debug, info, instrument, warn};

use super::convergence::MissingObject;
use super::fanout::FanOutReport;
use super::LifecycleOrchestrator;
use crate::error::{TenancyError, TenancyResult};
use crate::kubernetes::objects::{self, NODE_SELECTOR_ANNOTATION};
use crate::kubernetes::types::{namespace_to_info, quota_to_usage, QuotaUsage, TenantTargetInfo};
use crate::kubernetes::{
    get_typed, list_typed, ClusterObject, GatewayError, ObjectKind, ObjectRef,
};

/// What an update did to the network policy of a tenant-target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyChange {
    Created,
    Replaced,
    /// Several policies exist; none was touched
    Skipped { found: usize },
}

impl LifecycleOrchestrator {
    /// Granted target of `tenant`, or an authorization error
    pub(crate) async fn granted_target(&self, tenant: &str, target: &str) -> TenancyResult<Target> {
        let table = self.grants.grants(tenant).await?;
        let access_type = table
            .get(target)
            .ok_or_else(|| TenancyError::authorization(tenant, target))?;

        Ok(Target {
            name: target.to_string(),
            access_type,
        })
    }

    /// Instantiate a granted target for a tenant
    ///
    /// Objects are created one after another; the first failure aborts and
    /// objects created before it are left in place.
    #[instrument(skip(self, quota))]
    pub async fn create_tenant_target(
        &self,
        tenant: &str,
        target: &str,
        quota: Option<&QuotaSpec>,
    ) -> TenancyResult<TenantTargetInfo> {
        naming::validate_tenant_name(tenant)?;
        naming::validate_target_name(target)?;
        let quota = quota.unwrap_or(&self.default_quota);
        quota.validate()?;

        let target = self.granted_target(tenant, target).await?;
        let namespace = naming::tenant_target_namespace(tenant, &target.name);
        naming::validate_namespace_name(&namespace)?;

        let sequence: Vec<ClusterObject> = vec![
            objects::tenant_target_namespace(tenant, &target).into(),
            objects::resource_quota(&namespace, quota).into(),
            objects::tenant_target_role(&namespace).into(),
            objects::tenant_target_role_binding(&namespace, tenant, &self.tenant_namespace).into(),
            objects::network_policy(&namespace).into(),
        ];

        for object in sequence {
            debug!(object = %object.object_ref(), "Creating tenant-target object");
            self.gateway.create(object).await?;
        }

        info!(tenant = %tenant, target = %target, namespace = %namespace, "Tenant-target created");
        self.get_tenant_target(tenant, &target.name).await
    }

    /// Re-apply scheduling, quota, network policy and role of a tenant-target
    #[instrument(skip(self, update))]
    pub async fn update_tenant_target(
        &self,
        tenant: &str,
        target: &str,
        update: &QuotaUpdate,
    ) -> TenancyResult<PolicyChange> {
        update.validate()?;
        let target = self.granted_target(tenant, target).await?;
        let namespace = naming::tenant_target_namespace(tenant, &target.name);
        let gateway = self.gateway.as_ref();

        let mut ns: Namespace = get_typed(gateway, &ObjectRef::namespace(&namespace)).await?;
        let mut quota: ResourceQuota = get_typed(
            gateway,
            &ObjectRef::namespaced(
                ObjectKind::ResourceQuota,
                &namespace,
                &naming::quota_name(&namespace),
            ),
        )
        .await?;
        let policies: Vec<NetworkPolicy> =
            list_typed(gateway, ObjectKind::NetworkPolicy, Some(&namespace), None).await?;

        ns.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(NODE_SELECTOR_ANNOTATION.to_string(), target.node_selector());

        let changes = update.hard_limits();
        if !changes.is_empty() {
            let hard = quota
                .spec
                .get_or_insert_with(Default::default)
                .hard
                .get_or_insert_with(Default::default);
            for (key, amount) in changes {
                hard.insert(key, Quantity(amount));
            }
        }

        let policy_change = match policies.as_slice() {
            [] => {
                gateway.create(objects::network_policy(&namespace).into()).await?;
                PolicyChange::Created
            }
            [existing] => {
                let mut policy = objects::network_policy(&namespace);
                policy.metadata.name = existing.metadata.name.clone();
                policy.metadata.resource_version = existing.metadata.resource_version.clone();
                gateway.replace(policy.into()).await?;
                PolicyChange::Replaced
            }
            several => {
                warn!(
                    namespace = %namespace,
                    found = several.len(),
                    "More than one network policy, leaving them untouched"
                );
                PolicyChange::Skipped {
                    found: several.len(),
                }
            }
        };

        gateway.replace(quota.into()).await?;
        self.apply_role(&namespace).await?;
        gateway.replace(ns.into()).await?;

        info!(tenant = %tenant, target = %target, "Tenant-target updated");
        Ok(policy_change)
    }

    /// Replace the namespace role with the current rule set, creating it if missing
    async fn apply_role(&self, namespace: &str) -> TenancyResult<()> {
        let mut role = objects::tenant_target_role(namespace);
        let existing = ObjectRef::namespaced(ObjectKind::Role, namespace, &naming::role_name(namespace));

        match get_typed::<Role>(self.gateway.as_ref(), &existing).await {
            Ok(current) => {
                role.metadata.resource_version = current.metadata.resource_version;
                self.gateway.replace(role.into()).await?;
            }
            Err(GatewayError::NotFound(_)) => {
                self.gateway.create(role.into()).await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Tenant-targets of a tenant with their quota limits
    pub async fn list_tenant_targets(&self, tenant: &str) -> TenancyResult<Vec<TenantTargetInfo>> {
        let selector = format!("{}={}", labels::TENANT, tenant);
        let namespaces: Vec<Namespace> =
            list_typed(self.gateway.as_ref(), ObjectKind::Namespace, None, Some(&selector)).await?;

        let mut infos = Vec::with_capacity(namespaces.len());
        for ns in namespaces {
            let Some(mut info) = namespace_to_info(ns) else {
                continue;
            };
            info.quota = self.quota_of(&info.namespace).await?;
            infos.push(info);
        }
        Ok(infos)
    }

    /// Status, quota usage and pod count of one tenant-target
    pub async fn get_tenant_target(&self, tenant: &str, target: &str) -> TenancyResult<TenantTargetInfo> {
        let namespace = naming::tenant_target_namespace(tenant, target);
        let ns: Namespace = get_typed(self.gateway.as_ref(), &ObjectRef::namespace(&namespace)).await?;

        let mut info = namespace_to_info(ns).ok_or_else(|| {
            TenancyError::validation(format!("'{}' is not a tenant-target namespace", namespace))
        })?;
        info.quota = self.quota_of(&namespace).await?;
        info.pod_count = Some(
            self.gateway
                .list(ObjectKind::Pod, Some(&namespace), None)
                .await?
                .len(),
        );
        Ok(info)
    }

    /// Quota usage when the namespace has exactly one quota
    async fn quota_of(&self, namespace: &str) -> TenancyResult<Option<QuotaUsage>> {
        let quotas: Vec<ResourceQuota> =
            list_typed(self.gateway.as_ref(), ObjectKind::ResourceQuota, Some(namespace), None).await?;

        Ok(match quotas.as_slice() {
            [quota] => Some(quota_to_usage(quota)),
            _ => None,
        })
    }

    /// Delete tenant-targets concurrently
    ///
    /// Each unit checks the grant, deletes the namespace, waits until it is
    /// gone and then revokes the grant. An already absent namespace counts
    /// as deleted.
    #[instrument(skip(self))]
    pub async fn delete_tenant_targets(&self, tenant: &str, targets: &[String]) -> FanOutReport {
        let convergence = self.convergence();

        self.task_group()
            .run_with_policy(targets, self.policy().leaf, |target| {
                let orchestrator = self.clone();
                let tenant = tenant.to_string();
                async move {
                    naming::validate_target_name(&target)?;
                    orchestrator.granted_target(&tenant, &target).await?;

                    let namespace =
                        ObjectRef::namespace(&naming::tenant_target_namespace(&tenant, &target));
                    convergence
                        .delete_and_confirm(
                            orchestrator.gateway.as_ref(),
                            &namespace,
                            MissingObject::Confirm,
                        )
                        .await?;

                    match orchestrator.grants.revoke_target(&tenant, &target).await {
                        Err(TenancyError::Authorization { .. }) => {
                            debug!(tenant = %tenant, target = %target, "Grant already revoked");
                            Ok(())
                        }
                        other => other,
                    }
                }
            })
            .await
    }
}
