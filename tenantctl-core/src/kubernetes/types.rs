//! Request and summary types for tenant objects
//!
//! Summaries are flattened views of the typed k8s-openapi objects, built by
//! the `*_to_info` conversion functions below.

use k8s_openapi::api::core::v1::{Namespace, Pod, ResourceQuota, Secret};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenantctl_common::naming::validate_quantity;
use tenantctl_common::{naming, AccessGrant};

use super::objects::{DEPLOY_SECRET_TYPE, NODE_SELECTOR_ANNOTATION};

/// Pod creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodRequest {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub ports: Vec<i32>,
    /// Secrets exposed as environment variables named after the secret
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Registry credential used to pull the image
    pub deploy_secret: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub storage: Option<String>,
    /// Restart the container when it exits
    #[serde(default)]
    pub keep_alive: bool,
}

impl PodRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> tenantctl_common::Result<()> {
        naming::validate_object_name(&self.name)?;
        if self.image.trim().is_empty() {
            return Err(tenantctl_common::Error::Validation(
                "pod image must not be empty".to_string(),
            ));
        }
        for secret in self.secrets.iter().chain(self.deploy_secret.iter()) {
            naming::validate_object_name(secret)?;
        }
        for port in &self.ports {
            if !(1..=65535).contains(port) {
                return Err(tenantctl_common::Error::Validation(format!(
                    "port {} is out of range",
                    port
                )));
            }
        }
        if let Some(cpu) = &self.cpu {
            validate_quantity("cpu", cpu)?;
        }
        if let Some(memory) = &self.memory {
            validate_quantity("memory", memory)?;
        }
        if let Some(storage) = &self.storage {
            validate_quantity("storage", storage)?;
        }
        Ok(())
    }
}

/// Pod phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Pod summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub image: Option<String>,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    pub restart_count: i32,
    pub secrets: Vec<String>,
    pub created_at: Option<String>,
}

/// Secret summary (data values are not exposed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretInfo {
    pub name: String,
    pub namespace: String,
    pub secret_type: String,
    pub data_keys: Vec<String>,
    pub created_at: Option<String>,
}

impl SecretInfo {
    pub fn is_deploy_secret(&self) -> bool {
        self.secret_type == DEPLOY_SECRET_TYPE
    }
}

/// Whether a tenant's identity has been issued credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum Readiness {
    Ready,
    /// The readiness budget ran out; the tenant exists but has no credentials yet
    NotReady { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Tenant summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInfo {
    pub name: String,
    pub grants: Vec<AccessGrant>,
    pub default_target: Option<String>,
    pub credentials_ready: bool,
}

/// Limit/request pair for one resource, with usage when known
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub limit: Option<String>,
    pub request: Option<String>,
    pub used_limit: Option<String>,
    pub used_request: Option<String>,
}

/// Quota of a tenant-target namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub cpu: ResourceUsage,
    pub memory: ResourceUsage,
    pub storage: ResourceUsage,
}

/// Tenant-target summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantTargetInfo {
    pub tenant: String,
    pub target: String,
    pub namespace: String,
    pub phase: Option<String>,
    pub node_selector: Option<String>,
    /// `None` when the namespace does not carry exactly one quota
    pub quota: Option<QuotaUsage>,
    pub pod_count: Option<usize>,
}

/// Convert k8s Pod to PodInfo
pub fn pod_to_info(pod: Pod) -> PodInfo {
    let metadata = pod.metadata;
    let spec = pod.spec.unwrap_or_default();
    let status = pod.status.unwrap_or_default();

    let phase = match status.phase.as_deref() {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    };

    let container = spec.containers.first();
    let secrets = container
        .and_then(|c| c.env.as_ref())
        .map(|env| {
            env.iter()
                .filter_map(|var| var.value_from.as_ref()?.secret_key_ref.as_ref())
                .map(|selector| selector.name.clone())
                .collect()
        })
        .unwrap_or_default();

    let restart_count = status
        .container_statuses
        .unwrap_or_default()
        .iter()
        .map(|cs| cs.restart_count)
        .sum();

    PodInfo {
        name: metadata.name.unwrap_or_default(),
        namespace: metadata.namespace.unwrap_or_default(),
        phase,
        image: container.and_then(|c| c.image.clone()),
        node_name: spec.node_name,
        pod_ip: status.pod_ip,
        restart_count,
        secrets,
        created_at: metadata.creation_timestamp.map(|t| t.0.to_rfc3339()),
    }
}

/// Convert k8s Secret to SecretInfo
pub fn secret_to_info(secret: Secret) -> SecretInfo {
    let metadata = secret.metadata;

    let mut data_keys: Vec<String> = secret
        .data
        .map(|d| d.keys().cloned().collect())
        .unwrap_or_default();
    if let Some(string_data) = secret.string_data {
        data_keys.extend(string_data.into_keys());
    }
    data_keys.sort();
    data_keys.dedup();

    SecretInfo {
        name: metadata.name.unwrap_or_default(),
        namespace: metadata.namespace.unwrap_or_default(),
        secret_type: secret.type_.unwrap_or_else(|| "Opaque".to_string()),
        data_keys,
        created_at: metadata.creation_timestamp.map(|t| t.0.to_rfc3339()),
    }
}

/// Read limit/request/used values for cpu, memory and ephemeral storage
pub fn quota_to_usage(quota: &ResourceQuota) -> QuotaUsage {
    let hard = quota
        .spec
        .as_ref()
        .and_then(|s| s.hard.clone())
        .unwrap_or_default();
    let used = quota
        .status
        .as_ref()
        .and_then(|s| s.used.clone())
        .unwrap_or_default();

    let usage = |resource: &str| {
        let value =
            |map: &BTreeMap<String, Quantity>, key: String| map.get(&key).map(|q| q.0.clone());
        ResourceUsage {
            limit: value(&hard, format!("limits.{}", resource)),
            request: value(&hard, format!("requests.{}", resource)),
            used_limit: value(&used, format!("limits.{}", resource)),
            used_request: value(&used, format!("requests.{}", resource)),
        }
    };

    QuotaUsage {
        cpu: usage("cpu"),
        memory: usage("memory"),
        storage: usage("ephemeral-storage"),
    }
}

/// Convert a tenant-target namespace to TenantTargetInfo
///
/// Quota and pod count are filled in by the caller.
pub fn namespace_to_info(namespace: Namespace) -> Option<TenantTargetInfo> {
    let metadata = namespace.metadata;
    let name = metadata.name?;
    let labels = metadata.labels.unwrap_or_default();

    let tenant = labels
        .get(tenantctl_common::labels::TENANT)
        .cloned()
        .or_else(|| naming::tenant_from_namespace(&name).map(String::from))?;
    let target = labels
        .get(tenantctl_common::labels::TARGET)
        .cloned()
        .or_else(|| name.strip_prefix(&format!("{}-", tenant)).map(String::from))?;

    Some(TenantTargetInfo {
        tenant,
        target,
        phase: namespace.status.and_then(|s| s.phase),
        node_selector: metadata
            .annotations
            .and_then(|mut a| a.remove(NODE_SELECTOR_ANNOTATION)),
        namespace: name,
        quota: None,
        pod_count: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ResourceQuotaSpec, ResourceQuotaStatus};

    #[test]
    fn test_pod_request_validation() {
        let mut request = PodRequest::new("web", "nginx:1.27");
        assert!(request.validate().is_ok());

        request.ports = vec![0];
        assert!(request.validate().is_err());

        request.ports = vec![8080];
        request.memory = Some("lots".to_string());
        assert!(request.validate().is_err());

        let request = PodRequest::new("web", " ");
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_quota_to_usage() {
        let hard: BTreeMap<String, Quantity> = [
            ("limits.cpu", "2"),
            ("requests.cpu", "2"),
            ("limits.memory", "4Gi"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect();
        let used: BTreeMap<String, Quantity> = [("limits.cpu", "500m")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
            .collect();

        let quota = ResourceQuota {
            spec: Some(ResourceQuotaSpec {
                hard: Some(hard),
                ..Default::default()
            }),
            status: Some(ResourceQuotaStatus {
                used: Some(used),
                ..Default::default()
            }),
            ..Default::default()
        };

        let usage = quota_to_usage(&quota);
        assert_eq!(usage.cpu.limit.as_deref(), Some("2"));
        assert_eq!(usage.cpu.used_limit.as_deref(), Some("500m"));
        assert_eq!(usage.memory.request, None);
        assert_eq!(usage.storage, ResourceUsage::default());
    }

    #[test]
    fn test_namespace_to_info_falls_back_to_name() {
        let mut ns = Namespace::default();
        ns.metadata.name = Some("acme-gpu-a".to_string());

        let info = namespace_to_info(ns).unwrap();
        assert_eq!(info.tenant, "acme");
        assert_eq!(info.target, "gpu-a");
    }
}
