//! Target groups
//!
//! A group is a node label `tenantctl.group/<group>`; nodes valued `true`
//! belong to it. Defining a group writes the label on every node so that
//! membership is explicit on each of them.

use k8s_openapi::api::core::v1::Node;
use std::collections::{BTreeMap, BTreeSet};
use tenantctl_common::{labels, naming, AccessType, TargetScope};
use tracing::{debug, info, instrument};

use super::LifecycleOrchestrator;
use crate::error::{TenancyError, TenancyResult};
use crate::kubernetes::{get_typed, list_typed, GatewayError, ObjectKind, ObjectRef};
use crate::tenancy::grants::CONFLICT_BACKOFF;

fn node_names(node: &Node) -> (Option<&str>, Option<&str>) {
    let hostname = node
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(labels::NODE_HOSTNAME))
        .map(String::as_str);
    (node.metadata.name.as_deref(), hostname)
}

impl LifecycleOrchestrator {
    /// Define `group` as exactly the given nodes
    ///
    /// Nodes are named by hostname or object name. Returns the object names
    /// of the member nodes.
    #[instrument(skip(self))]
    pub async fn set_target_group(&self, group: &str, nodes: &[String]) -> TenancyResult<Vec<String>> {
        naming::validate_target_name(group)?;
        if nodes.is_empty() {
            return Err(TenancyError::validation("a target group needs at least one node"));
        }
        if self.catalog().find(group, &TargetScope::All).await?.is_some() {
            return Err(TenancyError::validation(format!(
                "target '{}' already exists",
                group
            )));
        }

        let all: Vec<Node> = list_typed(self.gateway.as_ref(), ObjectKind::Node, None, None).await?;
        let mut wanted: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();
        let mut membership = BTreeMap::new();

        for node in &all {
            let (name, hostname) = node_names(node);
            let Some(name) = name else { continue };
            let member = wanted.remove(name) | hostname.is_some_and(|h| wanted.remove(h));
            membership.insert(name.to_string(), member);
        }

        if let Some(unknown) = wanted.first() {
            return Err(TenancyError::validation(format!("unknown node '{}'", unknown)));
        }

        let key = format!("{}{}", labels::NODE_GROUP_PREFIX, group);
        let mut members = Vec::new();
        for (name, member) in membership {
            let value = member.to_string();
            self.relabel_node(&name, |node_labels| {
                node_labels.insert(key.clone(), value.clone()) != Some(value.clone())
            })
            .await?;
            if member {
                members.push(name);
            }
        }

        info!(group = %group, members = members.len(), "Target group set");
        Ok(members)
    }

    /// Remove the group label from every node
    #[instrument(skip(self))]
    pub async fn delete_target_group(&self, group: &str) -> TenancyResult<()> {
        match self.catalog().find(group, &TargetScope::All).await? {
            Some(target) if target.access_type == AccessType::Group => {}
            _ => {
                return Err(TenancyError::validation(format!(
                    "'{}' is not a target group",
                    group
                )))
            }
        }

        let key = format!("{}{}", labels::NODE_GROUP_PREFIX, group);
        let all: Vec<Node> = list_typed(self.gateway.as_ref(), ObjectKind::Node, None, None).await?;
        for node in &all {
            let labelled = node
                .metadata
                .labels
                .as_ref()
                .is_some_and(|l| l.contains_key(&key));
            if let (Some(name), true) = (node.metadata.name.as_deref(), labelled) {
                self.relabel_node(name, |node_labels| node_labels.remove(&key).is_some())
                    .await?;
            }
        }

        info!(group = %group, "Target group deleted");
        Ok(())
    }

    /// Read-modify-write of a node's labels, retried on conflict
    async fn relabel_node<F>(&self, name: &str, mut mutate: F) -> TenancyResult<()>
    where
        F: FnMut(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let object = ObjectRef::cluster(ObjectKind::Node, name);
        let attempts = self.settings.conflict_retries + 1;

        for attempt in 1..=attempts {
            let mut node: Node = get_typed(self.gateway.as_ref(), &object).await?;
            let node_labels = node.metadata.labels.get_or_insert_with(BTreeMap::new);
            if !mutate(node_labels) {
                return Ok(());
            }

            match self.gateway.replace(node.into()).await {
                Ok(_) => return Ok(()),
                Err(GatewayError::Conflict(_)) if attempt < attempts => {
                    debug!(node = %name, attempt, "Node changed concurrently, retrying");
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                }
                Err(GatewayError::Conflict(_)) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Err(TenancyError::ConflictRetriesExhausted { object, attempts })
    }
}
