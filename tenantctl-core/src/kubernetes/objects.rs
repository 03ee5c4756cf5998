//! Object factory
//!
//! Builds the typed objects tenantctl creates. Objects only exist locally
//! until handed to a [`ClusterGateway`](super::ClusterGateway).

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, LocalObjectReference, Namespace, Pod,
    PodSpec, ResourceQuota, ResourceQuotaSpec, ResourceRequirements, Secret, SecretKeySelector,
    ServiceAccount,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use tenantctl_common::{labels, naming, QuotaSpec, Target};

use super::types::PodRequest;

/// Namespace annotation read by the PodNodeSelector admission plugin
pub const NODE_SELECTOR_ANNOTATION: &str = "scheduler.alpha.kubernetes.io/node-selector";

/// Key holding the payload of an opaque tenant secret
pub const SECRET_DATA_KEY: &str = "secret";

pub const DEPLOY_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn meta(name: String, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Tenant identity
// ============================================================================

/// ServiceAccount that identifies a tenant and carries its grant labels
pub fn tenant_identity(tenant: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            labels: Some(string_map(&[(labels::TENANT, tenant)])),
            ..meta(naming::tenant_identity(tenant), namespace)
        },
        ..Default::default()
    }
}

/// Lets a tenant read its own identity and list the namespaces it was given
pub fn tenant_default_role(tenant: &str, namespace: &str) -> Role {
    Role {
        metadata: ObjectMeta {
            labels: Some(string_map(&[(labels::TENANT, tenant)])),
            ..meta(naming::tenant_default_role(tenant), namespace)
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(strings(&[""])),
            resources: Some(strings(&["serviceaccounts"])),
            resource_names: Some(vec![naming::tenant_identity(tenant)]),
            verbs: strings(&["get", "watch"]),
            ..Default::default()
        }]),
    }
}

pub fn tenant_default_role_binding(tenant: &str, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            labels: Some(string_map(&[(labels::TENANT, tenant)])),
            ..meta(naming::tenant_default_role_binding(tenant), namespace)
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: naming::tenant_default_role(tenant),
        },
        subjects: Some(vec![tenant_subject(tenant, namespace)]),
    }
}

fn tenant_subject(tenant: &str, identity_namespace: &str) -> Subject {
    Subject {
        api_group: None,
        kind: "ServiceAccount".to_string(),
        name: naming::tenant_identity(tenant),
        namespace: Some(identity_namespace.to_string()),
    }
}

// ============================================================================
// Tenant-target
// ============================================================================

/// Namespace pinned onto a target through the node-selector annotation
pub fn tenant_target_namespace(tenant: &str, target: &Target) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(naming::tenant_target_namespace(tenant, &target.name)),
            labels: Some(string_map(&[
                (labels::TENANT, tenant),
                (labels::TARGET, &target.name),
            ])),
            annotations: Some(string_map(&[(
                NODE_SELECTOR_ANNOTATION,
                &target.node_selector(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn resource_quota(namespace: &str, quota: &QuotaSpec) -> ResourceQuota {
    let hard = quota
        .hard_limits()
        .into_iter()
        .map(|(k, v)| (k, Quantity(v)))
        .collect();

    ResourceQuota {
        metadata: meta(naming::quota_name(namespace), namespace),
        spec: Some(ResourceQuotaSpec {
            hard: Some(hard),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// What a tenant may do inside one of its tenant-target namespaces
pub fn tenant_target_role(namespace: &str) -> Role {
    Role {
        metadata: meta(naming::role_name(namespace), namespace),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(strings(&[""])),
                resources: Some(strings(&["pods", "secrets", "configmaps"])),
                verbs: strings(&["get", "list", "watch", "create", "update", "delete"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(strings(&[""])),
                resources: Some(strings(&["pods/log", "events", "resourcequotas"])),
                verbs: strings(&["get", "list", "watch"]),
                ..Default::default()
            },
        ]),
    }
}

pub fn tenant_target_role_binding(
    namespace: &str,
    tenant: &str,
    identity_namespace: &str,
) -> RoleBinding {
    RoleBinding {
        metadata: meta(naming::role_binding_name(namespace), namespace),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: naming::role_name(namespace),
        },
        subjects: Some(vec![tenant_subject(tenant, identity_namespace)]),
    }
}

/// Deny ingress except from pods of the same tenant-target
pub fn network_policy(namespace: &str) -> NetworkPolicy {
    NetworkPolicy {
        metadata: meta(naming::network_policy_name(namespace), namespace),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(strings(&["Ingress"])),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(LabelSelector {
                        match_labels: Some(string_map(&[(labels::NETWORK, namespace)])),
                        match_expressions: None,
                    }),
                    ..Default::default()
                }]),
                ports: None,
            }]),
            egress: None,
        }),
    }
}

// ============================================================================
// Workloads
// ============================================================================

/// Single-container pod; every amount given is used as both limit and request
pub fn pod(namespace: &str, request: &PodRequest) -> Pod {
    let mut resources = BTreeMap::new();
    for (resource, amount) in [
        ("cpu", &request.cpu),
        ("memory", &request.memory),
        ("ephemeral-storage", &request.storage),
    ] {
        if let Some(amount) = amount {
            resources.insert(resource.to_string(), Quantity(amount.clone()));
        }
    }

    let env: Vec<EnvVar> = request
        .secrets
        .iter()
        .map(|secret| EnvVar {
            name: secret.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.clone(),
                    key: SECRET_DATA_KEY.to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
            value: None,
        })
        .collect();

    let container = Container {
        name: request.name.clone(),
        image: Some(request.image.clone()),
        command: if request.command.is_empty() {
            None
        } else {
            Some(request.command.clone())
        },
        ports: if request.ports.is_empty() {
            None
        } else {
            Some(
                request
                    .ports
                    .iter()
                    .map(|port| ContainerPort {
                        container_port: *port,
                        ..Default::default()
                    })
                    .collect(),
            )
        },
        env: if env.is_empty() { None } else { Some(env) },
        resources: if resources.is_empty() {
            None
        } else {
            Some(ResourceRequirements {
                limits: Some(resources.clone()),
                requests: Some(resources),
                ..Default::default()
            })
        },
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            labels: Some(string_map(&[(labels::NETWORK, namespace)])),
            ..meta(request.name.clone(), namespace)
        },
        spec: Some(PodSpec {
            containers: vec![container],
            image_pull_secrets: request.deploy_secret.as_ref().map(|name| {
                vec![LocalObjectReference { name: name.clone() }]
            }),
            restart_policy: Some(if request.keep_alive { "Always" } else { "Never" }.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Opaque secret with its payload under [`SECRET_DATA_KEY`]
pub fn opaque_secret(namespace: &str, name: &str, data: &str) -> Secret {
    Secret {
        metadata: meta(name.to_string(), namespace),
        string_data: Some(string_map(&[(SECRET_DATA_KEY, data)])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Registry credential secret usable as an image pull secret
pub fn deploy_secret(namespace: &str, name: &str, docker_config: Vec<u8>) -> Secret {
    Secret {
        metadata: meta(name.to_string(), namespace),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_KEY.to_string(),
            ByteString(docker_config),
        )])),
        type_: Some(DEPLOY_SECRET_TYPE.to_string()),
        ..Default::default()
    }
}
