//! Target catalog
//!
//! Cluster-wide targets come from node labels: one node target per hostname
//! label and one group target per distinct group marker. Tenant-scoped
//! targets come from the grant labels on the tenant identity.

use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeSet;
use std::sync::Arc;
use tenantctl_common::{labels, GrantTable, Target, TargetScope};
use tracing::instrument;

use super::fetch_identity;
use crate::error::TenancyResult;
use crate::kubernetes::{list_typed, ClusterGateway, ObjectKind};

#[derive(Clone)]
pub struct TargetCatalog {
    gateway: Arc<dyn ClusterGateway>,
    tenant_namespace: String,
}

impl TargetCatalog {
    pub fn new(gateway: Arc<dyn ClusterGateway>, tenant_namespace: impl Into<String>) -> Self {
        Self {
            gateway,
            tenant_namespace: tenant_namespace.into(),
        }
    }

    /// Enumerate targets in `scope`. Read failures are returned as is.
    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn list_targets(&self, scope: &TargetScope) -> TenancyResult<Vec<Target>> {
        match scope {
            TargetScope::All => {
                let nodes: Vec<Node> =
                    list_typed(self.gateway.as_ref(), ObjectKind::Node, None, None).await?;
                Ok(targets_from_nodes(&nodes))
            }
            TargetScope::Tenant(tenant) => {
                let identity =
                    fetch_identity(self.gateway.as_ref(), &self.tenant_namespace, tenant).await?;
                let labels = identity.metadata.labels.unwrap_or_default();
                Ok(GrantTable::from_labels(&labels).targets())
            }
        }
    }

    /// Look a target up by name
    pub async fn find(&self, name: &str, scope: &TargetScope) -> TenancyResult<Option<Target>> {
        Ok(self
            .list_targets(scope)
            .await?
            .into_iter()
            .find(|t| t.name == name))
    }
}

/// Derive node and group targets from node labels
///
/// Group markers valued `"false"` are ignored, as are empty group names.
pub fn targets_from_nodes(nodes: &[Node]) -> Vec<Target> {
    let mut targets = Vec::new();
    let mut groups = BTreeSet::new();

    for node in nodes {
        let Some(node_labels) = node.metadata.labels.as_ref() else {
            continue;
        };

        if let Some(hostname) = node_labels
            .get(labels::NODE_HOSTNAME)
            .filter(|h| !h.is_empty())
        {
            targets.push(Target::node(hostname.clone()));
        }

        for (key, value) in node_labels {
            if let Some(group) = key.strip_prefix(labels::NODE_GROUP_PREFIX) {
                if !group.is_empty() && value != "false" {
                    groups.insert(group.to_string());
                }
            }
        }
    }

    targets.extend(groups.into_iter().map(Target::group));
    targets
}
