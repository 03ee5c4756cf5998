//! Persisted metadata layout
//!
//! Grants and the default target live as labels on the tenant identity object.
//! Each grant is its own boolean key, so any number of grants coexist without
//! a joined value. These keys are stored state: never rename them.

use crate::{AccessGrant, AccessType, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the target a tenant's commands use when none is given
pub const DEFAULT_TARGET: &str = "tenantctl/default-target";

/// `NODE_ACCESS_PREFIX + <node>` = "true" grants a node target
pub const NODE_ACCESS_PREFIX: &str = "tenantctl.node-access/";

/// `GROUP_ACCESS_PREFIX + <group>` = "true" grants a group target
pub const GROUP_ACCESS_PREFIX: &str = "tenantctl.group-access/";

/// Node label carrying the node target name
pub const NODE_HOSTNAME: &str = "kubernetes.io/hostname";

/// `NODE_GROUP_PREFIX + <group>` on a node marks group membership; "false" opts out
pub const NODE_GROUP_PREFIX: &str = "tenantctl.group/";

/// Tenant marker on identity objects and tenant-target namespaces
pub const TENANT: &str = "tenantctl/tenant";

/// Target marker on tenant-target namespaces
pub const TARGET: &str = "tenantctl/target";

/// Pod label scoping network policy peers to one tenant-target
pub const NETWORK: &str = "network";

/// Reserved character that target names must never contain
pub const GRANT_DELIMITER: char = '_';

const GRANTED: &str = "true";

/// Read the default target, treating an empty value as unset
pub fn default_target(labels: &BTreeMap<String, String>) -> Option<&str> {
    labels
        .get(DEFAULT_TARGET)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// Set or clear the default target
pub fn set_default_target(labels: &mut BTreeMap<String, String>, target: Option<&str>) {
    match target {
        Some(target) => {
            labels.insert(DEFAULT_TARGET.to_string(), target.to_string());
        }
        None => {
            labels.remove(DEFAULT_TARGET);
        }
    }
}

/// The grants of a single tenant, keyed by target name.
///
/// A map keyed on the target enforces at most one grant per (tenant, target).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantTable {
    grants: BTreeMap<String, AccessType>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode from identity labels. Node keys win if a target is recorded twice.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        let mut grants = BTreeMap::new();

        for access_type in [AccessType::Node, AccessType::Group] {
            for (key, value) in labels {
                if value != GRANTED {
                    continue;
                }
                if let Some(target) = key.strip_prefix(access_type.grant_prefix()) {
                    if !target.is_empty() {
                        grants.entry(target.to_string()).or_insert(access_type);
                    }
                }
            }
        }

        Self { grants }
    }

    /// Rewrite every grant key in `labels` to match this table. Other labels are untouched.
    pub fn write_labels(&self, labels: &mut BTreeMap<String, String>) {
        labels.retain(|key, _| {
            !key.starts_with(NODE_ACCESS_PREFIX) && !key.starts_with(GROUP_ACCESS_PREFIX)
        });

        for (target, access_type) in &self.grants {
            labels.insert(
                format!("{}{}", access_type.grant_prefix(), target),
                GRANTED.to_string(),
            );
        }
    }

    /// Record a grant; returns false when the target was already granted
    pub fn insert(&mut self, target: &str, access_type: AccessType) -> bool {
        self.grants
            .insert(target.to_string(), access_type)
            .is_none()
    }

    pub fn remove(&mut self, target: &str) -> Option<AccessType> {
        self.grants.remove(target)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.grants.contains_key(target)
    }

    pub fn get(&self, target: &str) -> Option<AccessType> {
        self.grants.get(target).copied()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Granted targets in name order
    pub fn targets(&self) -> Vec<Target> {
        self.grants
            .iter()
            .map(|(name, access_type)| Target {
                name: name.clone(),
                access_type: *access_type,
            })
            .collect()
    }

    /// Relation rows for `tenant`
    pub fn rows(&self, tenant: &str) -> Vec<AccessGrant> {
        self.grants
            .iter()
            .map(|(target, access_type)| AccessGrant {
                tenant: tenant.to_string(),
                target: target.clone(),
                access_type: *access_type,
            })
            .collect()
    }

    /// First granted target in name order
    pub fn first(&self) -> Option<&str> {
        self.grants.keys().next().map(String::as_str)
    }
}
