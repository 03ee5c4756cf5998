//! Access grant store
//!
//! Grants and the default target live in the labels of the tenant identity.
//! Every change is a read-modify-replace against the identity's
//! resourceVersion, retried when another writer got there first. Writes for
//! one tenant from this process are serialized by a per-tenant writer lock.

use k8s_openapi::api::core::v1::ServiceAccount;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as WriterLock;
use tenantctl_common::labels::{self, GRANT_DELIMITER};
use tenantctl_common::{naming, AccessGrant, GrantTable, TargetScope};
use tracing::{debug, info, instrument, warn};

use super::{fetch_identity, identity_ref, TargetCatalog};
use crate::error::{TenancyError, TenancyResult};
use crate::kubernetes::{get_typed, ClusterGateway, GatewayError};

/// Pause before retry `n` is `n` times this
pub(crate) const CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

/// Grants and default target of one tenant, read together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSnapshot {
    pub table: GrantTable,
    pub default_target: Option<String>,
}

impl GrantSnapshot {
    fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        Self {
            table: GrantTable::from_labels(labels),
            default_target: labels::default_target(labels).map(String::from),
        }
    }
}

#[derive(Clone)]
pub struct AccessGrantStore {
    gateway: Arc<dyn ClusterGateway>,
    catalog: TargetCatalog,
    tenant_namespace: String,
    conflict_retries: u32,
    writers: Arc<Mutex<HashMap<String, Arc<WriterLock<()>>>>>,
}

impl AccessGrantStore {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        catalog: TargetCatalog,
        tenant_namespace: impl Into<String>,
        conflict_retries: u32,
    ) -> Self {
        Self {
            gateway,
            catalog,
            tenant_namespace: tenant_namespace.into(),
            conflict_retries,
            writers: Arc::default(),
        }
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    /// Whether `target` exists in `scope`
    ///
    /// Fails closed: names containing the grant delimiter and catalog read
    /// errors both yield `false`.
    pub async fn is_valid_target(&self, target: &str, scope: &TargetScope) -> bool {
        if target.contains(GRANT_DELIMITER) {
            return false;
        }

        match self.catalog.list_targets(scope).await {
            Ok(targets) => targets.iter().any(|t| t.name == target),
            Err(e) => {
                warn!(target = %target, scope = %scope, error = %e, "Target lookup failed");
                false
            }
        }
    }

    pub async fn snapshot(&self, tenant: &str) -> TenancyResult<GrantSnapshot> {
        let identity =
            fetch_identity(self.gateway.as_ref(), &self.tenant_namespace, tenant).await?;
        Ok(GrantSnapshot::from_labels(
            &identity.metadata.labels.unwrap_or_default(),
        ))
    }

    pub async fn grants(&self, tenant: &str) -> TenancyResult<GrantTable> {
        Ok(self.snapshot(tenant).await?.table)
    }

    /// Relation rows of `tenant` in target name order
    pub async fn list_grants(&self, tenant: &str) -> TenancyResult<Vec<AccessGrant>> {
        Ok(self.grants(tenant).await?.rows(tenant))
    }

    /// Grant a cluster target to a tenant
    ///
    /// Granting an already granted target changes nothing. The first grant
    /// of a tenant without a default target becomes its default.
    #[instrument(skip(self))]
    pub async fn grant_target(&self, tenant: &str, target: &str) -> TenancyResult<AccessGrant> {
        naming::validate_target_name(target)?;

        let found = self
            .catalog
            .find(target, &TargetScope::All)
            .await?
            .ok_or_else(|| {
                TenancyError::validation(format!("'{}' is not a target in this cluster", target))
            })?;

        let namespace = naming::tenant_target_namespace(tenant, &found.name);
        if naming::validate_namespace_name(&namespace).is_err() {
            return Err(TenancyError::validation(format!(
                "'{}' cannot be granted to '{}': its namespace '{}' is not a valid namespace name",
                found.name, tenant, namespace
            )));
        }

        self.update_identity(tenant, |identity_labels| {
            let mut table = GrantTable::from_labels(identity_labels);
            if let Some(existing) = table.get(&found.name) {
                if existing != found.access_type {
                    return Err(TenancyError::validation(format!(
                        "'{}' is already granted to '{}' as a {} target",
                        found.name, tenant, existing
                    )));
                }
            }
            let mut changed = table.insert(&found.name, found.access_type);
            table.write_labels(identity_labels);

            if labels::default_target(identity_labels).is_none() {
                labels::set_default_target(identity_labels, Some(&found.name));
                changed = true;
            }
            Ok(changed)
        })
        .await?;

        info!(tenant = %tenant, target = %found, "Target granted");

        Ok(AccessGrant {
            tenant: tenant.to_string(),
            target: found.name,
            access_type: found.access_type,
        })
    }

    /// Revoke a granted target
    ///
    /// Revoking the default target moves the default to the first remaining
    /// grant, or clears it when none remain.
    #[instrument(skip(self))]
    pub async fn revoke_target(&self, tenant: &str, target: &str) -> TenancyResult<()> {
        if target.contains(GRANT_DELIMITER) {
            return Err(tenantctl_common::Error::DelimiterConflict(target.to_string()).into());
        }

        if !self.grants(tenant).await?.contains(target) {
            return Err(TenancyError::authorization(tenant, target));
        }

        self.update_identity(tenant, |identity_labels| {
            let mut table = GrantTable::from_labels(identity_labels);
            if table.remove(target).is_none() {
                // Revoked concurrently
                return Ok(false);
            }
            table.write_labels(identity_labels);

            if labels::default_target(identity_labels) == Some(target) {
                labels::set_default_target(identity_labels, table.first());
            }
            Ok(true)
        })
        .await?;

        info!(tenant = %tenant, target = %target, "Target revoked");
        Ok(())
    }

    pub async fn default_target(&self, tenant: &str) -> TenancyResult<Option<String>> {
        Ok(self.snapshot(tenant).await?.default_target)
    }

    /// Store `target` as the default without checking it is granted
    #[instrument(skip(self))]
    pub async fn set_default_target(&self, tenant: &str, target: &str) -> TenancyResult<()> {
        naming::validate_target_name(target)?;

        self.update_identity(tenant, |identity_labels| {
            if labels::default_target(identity_labels) == Some(target) {
                return Ok(false);
            }
            labels::set_default_target(identity_labels, Some(target));
            Ok(true)
        })
        .await?;

        info!(tenant = %tenant, target = %target, "Default target set");
        Ok(())
    }

    fn writer(&self, tenant: &str) -> Arc<WriterLock<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        writers.entry(tenant.to_string()).or_default().clone()
    }

    /// Compare-and-swap loop over the identity labels
    ///
    /// `mutate` returns whether it changed anything; unchanged labels are not
    /// written back.
    async fn update_identity<F>(&self, tenant: &str, mut mutate: F) -> TenancyResult<()>
    where
        F: FnMut(&mut BTreeMap<String, String>) -> TenancyResult<bool> + Send,
    {
        let writer = self.writer(tenant);
        let _serialized = writer.lock().await;

        let identity = identity_ref(&self.tenant_namespace, tenant);
        let attempts = self.conflict_retries + 1;

        for attempt in 1..=attempts {
            let mut account: ServiceAccount = get_typed(self.gateway.as_ref(), &identity).await?;
            let mut identity_labels = account.metadata.labels.take().unwrap_or_default();

            if !mutate(&mut identity_labels)? {
                return Ok(());
            }

            account.metadata.labels = if identity_labels.is_empty() {
                None
            } else {
                Some(identity_labels)
            };

            match self.gateway.replace(account.into()).await {
                Ok(_) => return Ok(()),
                Err(GatewayError::Conflict(_)) if attempt < attempts => {
                    debug!(tenant = %tenant, attempt, "Identity changed concurrently, retrying");
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                }
                Err(GatewayError::Conflict(_)) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Err(TenancyError::ConflictRetriesExhausted {
            object: identity,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::memory::InMemoryGateway;
    use crate::kubernetes::objects;

    fn store(gateway: Arc<InMemoryGateway>) -> AccessGrantStore {
        let catalog = TargetCatalog::new(gateway.clone(), "default");
        AccessGrantStore::new(gateway, catalog, "default", 2)
    }

    fn cluster() -> Arc<InMemoryGateway> {
        let gateway = InMemoryGateway::new();
        gateway.add_node("n1", &[("kubernetes.io/hostname", "n1")]);
        gateway.add_node(
            "n2",
            &[("kubernetes.io/hostname", "n2"), ("tenantctl.group/gpu", "true")],
        );
        gateway.seed(objects::tenant_identity("acme", "default"));
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_delimiter_fails_closed() {
        let gateway = cluster();
        gateway.add_node("odd", &[("kubernetes.io/hostname", "odd_node")]);
        let store = store(gateway);

        assert!(!store.is_valid_target("odd_node", &TargetScope::All).await);
        assert!(store.is_valid_target("n1", &TargetScope::All).await);
    }

    #[tokio::test]
    async fn test_lookup_errors_fail_closed() {
        let gateway = cluster();
        gateway.fail_list(crate::kubernetes::ObjectKind::Node);
        let store = store(gateway);

        assert!(!store.is_valid_target("n1", &TargetScope::All).await);
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let store = store(cluster());
        let err = store.grant_target("acme", "n9").await.unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_target_without_valid_namespace_is_not_granted() {
        let gateway = cluster();
        gateway.add_node("fqdn", &[("kubernetes.io/hostname", "node1.example.com")]);
        let store = store(gateway);

        let err = store
            .grant_target("acme", "node1.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));
        assert!(err.to_string().contains("acme-node1.example.com"));
        assert!(store.grants("acme").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_and_group_sharing_a_name_are_not_both_granted() {
        let gateway = cluster();
        let store = store(gateway.clone());
        store.grant_target("acme", "gpu").await.unwrap();

        gateway.add_node("n3", &[("kubernetes.io/hostname", "gpu")]);
        let err = store.grant_target("acme", "gpu").await.unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));

        let table = store.grants("acme").await.unwrap();
        assert_eq!(table.get("gpu"), Some(tenantctl_common::AccessType::Group));
    }

    #[tokio::test]
    async fn test_revoke_moves_default_to_remaining_grant() {
        let store = store(cluster());
        store.grant_target("acme", "n1").await.unwrap();
        store.grant_target("acme", "gpu").await.unwrap();

        store.revoke_target("acme", "n1").await.unwrap();
        assert_eq!(store.default_target("acme").await.unwrap().as_deref(), Some("gpu"));

        store.revoke_target("acme", "gpu").await.unwrap();
        assert_eq!(store.default_target("acme").await.unwrap(), None);
        assert!(store.grants("acme").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writer_is_not_clobbered() {
        let gateway = cluster();
        let identity = identity_ref("default", "acme");
        gateway.interfere_on_replace(identity, |object| {
            let labels = object.metadata_mut().labels.get_or_insert_with(BTreeMap::new);
            labels.insert("tenantctl.group-access/gpu".to_string(), "true".to_string());
        });
        let store = store(gateway);

        store.grant_target("acme", "n1").await.unwrap();

        let table = store.grants("acme").await.unwrap();
        assert!(table.contains("n1"));
        assert!(table.contains("gpu"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_retries_are_bounded() {
        let gateway = cluster();
        gateway.conflict_on_replace(identity_ref("default", "acme"), 10);
        let store = store(gateway);

        let err = store.grant_target("acme", "n1").await.unwrap_err();
        assert!(matches!(
            err,
            TenancyError::ConflictRetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_tenant_is_a_gateway_error() {
        let store = store(cluster());
        let err = store.grant_target("ghost", "n1").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
