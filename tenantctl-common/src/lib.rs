//! Common types shared between tenantctl-core and tenantctl-cli
//!
//! Everything here is pure data: targets, the tenant↔target grant relation,
//! quota requests, the persisted label layout and object naming rules.

pub mod labels;
pub mod naming;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use labels::GrantTable;

/// How a tenant reaches a target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Node,
    Group,
}

impl AccessType {
    /// Label prefix used on a tenant identity to record a grant of this type
    pub fn grant_prefix(&self) -> &'static str {
        match self {
            AccessType::Node => labels::NODE_ACCESS_PREFIX,
            AccessType::Group => labels::GROUP_ACCESS_PREFIX,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Node => "node",
            AccessType::Group => "group",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An addressable unit of cluster capacity: a single node or a named node group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub name: String,
    pub access_type: AccessType,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_type: AccessType::Node,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_type: AccessType::Group,
        }
    }

    /// Node selector expression that pins workloads onto this target
    pub fn node_selector(&self) -> String {
        match self.access_type {
            AccessType::Node => format!("{}={}", labels::NODE_HOSTNAME, self.name),
            AccessType::Group => format!("{}{}=true", labels::NODE_GROUP_PREFIX, self.name),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.access_type)
    }
}

/// One row of the tenant↔target authorization relation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessGrant {
    pub tenant: String,
    pub target: String,
    pub access_type: AccessType,
}

/// Which slice of the catalog to enumerate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetScope {
    /// Every target the cluster topology offers
    All,
    /// Only the targets granted to this tenant
    Tenant(String),
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetScope::All => f.write_str("cluster"),
            TargetScope::Tenant(tenant) => write!(f, "tenant {}", tenant),
        }
    }
}

/// CPU, memory and ephemeral-storage amounts for a tenant-target quota.
///
/// Each amount is applied as both limit and request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuotaSpec {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
}

impl Default for QuotaSpec {
    fn default() -> Self {
        Self {
            cpu: "2".to_string(),
            memory: "4Gi".to_string(),
            storage: "10Gi".to_string(),
        }
    }
}

impl QuotaSpec {
    /// Check every amount is a Kubernetes quantity
    pub fn validate(&self) -> Result<()> {
        naming::validate_quantity("cpu", &self.cpu)?;
        naming::validate_quantity("memory", &self.memory)?;
        naming::validate_quantity("storage", &self.storage)?;
        Ok(())
    }

    /// `hard` entries of a ResourceQuota spec
    pub fn hard_limits(&self) -> BTreeMap<String, String> {
        let mut hard = BTreeMap::new();
        for (resource, amount) in [
            ("cpu", &self.cpu),
            ("memory", &self.memory),
            ("ephemeral-storage", &self.storage),
        ] {
            hard.insert(format!("limits.{}", resource), amount.clone());
            hard.insert(format!("requests.{}", resource), amount.clone());
        }
        hard
    }
}

/// Partial quota change; `None` keeps the current amount
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaUpdate {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub storage: Option<String>,
}

impl QuotaUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(cpu) = &self.cpu {
            naming::validate_quantity("cpu", cpu)?;
        }
        if let Some(memory) = &self.memory {
            naming::validate_quantity("memory", memory)?;
        }
        if let Some(storage) = &self.storage {
            naming::validate_quantity("storage", storage)?;
        }
        Ok(())
    }

    /// `hard` entries to overwrite
    pub fn hard_limits(&self) -> BTreeMap<String, String> {
        let mut hard = BTreeMap::new();
        for (resource, amount) in [
            ("cpu", &self.cpu),
            ("memory", &self.memory),
            ("ephemeral-storage", &self.storage),
        ] {
            if let Some(amount) = amount {
                hard.insert(format!("limits.{}", resource), amount.clone());
                hard.insert(format!("requests.{}", resource), amount.clone());
            }
        }
        hard
    }
}

/// Shared error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Target name '{0}' contains the reserved delimiter '{delim}'", delim = labels::GRANT_DELIMITER)]
    DelimiterConflict(String),

    #[error("Invalid {field} quantity '{value}'")]
    InvalidQuantity { field: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
