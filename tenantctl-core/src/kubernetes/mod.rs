//! Cluster gateway
//!
//! Everything tenantctl does to a cluster goes through [`ClusterGateway`]:
//! get, list, create, conditional replace and delete of a closed set of
//! object kinds, plus pod logs and waiting for an object to disappear.
//!
//! - [`gateway::KubeGateway`] talks to a real API server via kube-rs
//! - [`memory::InMemoryGateway`] is an in-process cluster used by tests

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod objects;
pub mod types;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Namespace, Node, Pod, ResourceQuota, Secret, ServiceAccount,
};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub use error::{GatewayError, GatewayResult};

/// Object kinds tenantctl manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    ServiceAccount,
    Role,
    RoleBinding,
    Namespace,
    ResourceQuota,
    NetworkPolicy,
    Secret,
    Pod,
    Node,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::ServiceAccount => "serviceaccount",
            ObjectKind::Role => "role",
            ObjectKind::RoleBinding => "rolebinding",
            ObjectKind::Namespace => "namespace",
            ObjectKind::ResourceQuota => "resourcequota",
            ObjectKind::NetworkPolicy => "networkpolicy",
            ObjectKind::Secret => "secret",
            ObjectKind::Pod => "pod",
            ObjectKind::Node => "node",
        }
    }

    /// Whether objects of this kind live inside a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ObjectKind::Namespace | ObjectKind::Node)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a single cluster object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn namespaced(kind: ObjectKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(kind: ObjectKind, name: &str) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn namespace(name: &str) -> Self {
        Self::cluster(ObjectKind::Namespace, name)
    }

    pub fn pod(namespace: &str, name: &str) -> Self {
        Self::namespaced(ObjectKind::Pod, namespace, name)
    }

    pub fn secret(namespace: &str, name: &str) -> Self {
        Self::namespaced(ObjectKind::Secret, namespace, name)
    }

    pub fn service_account(namespace: &str, name: &str) -> Self {
        Self::namespaced(ObjectKind::ServiceAccount, namespace, name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

macro_rules! cluster_objects {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// A typed cluster object of one of the managed kinds
        #[derive(Debug, Clone, PartialEq)]
        pub enum ClusterObject {
            $($variant($ty),)*
        }

        impl ClusterObject {
            pub fn kind(&self) -> ObjectKind {
                match self {
                    $(ClusterObject::$variant(_) => ObjectKind::$variant,)*
                }
            }

            pub fn metadata(&self) -> &ObjectMeta {
                match self {
                    $(ClusterObject::$variant(o) => &o.metadata,)*
                }
            }

            pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(ClusterObject::$variant(o) => &mut o.metadata,)*
                }
            }
        }

        $(
            impl From<$ty> for ClusterObject {
                fn from(object: $ty) -> Self {
                    ClusterObject::$variant(object)
                }
            }

            impl TryFrom<ClusterObject> for $ty {
                type Error = GatewayError;

                fn try_from(object: ClusterObject) -> GatewayResult<Self> {
                    match object {
                        ClusterObject::$variant(inner) => Ok(inner),
                        #[allow(unreachable_patterns)]
                        other => Err(GatewayError::UnexpectedKind {
                            expected: ObjectKind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }
            }
        )*
    };
}

cluster_objects! {
    ServiceAccount => ServiceAccount,
    Role => Role,
    RoleBinding => RoleBinding,
    Namespace => Namespace,
    ResourceQuota => ResourceQuota,
    NetworkPolicy => NetworkPolicy,
    Secret => Secret,
    Pod => Pod,
    Node => Node,
}

impl ClusterObject {
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn object_ref(&self) -> ObjectRef {
        let kind = self.kind();
        ObjectRef {
            kind,
            namespace: if kind.is_namespaced() {
                self.metadata().namespace.clone()
            } else {
                None
            },
            name: self.name().to_string(),
        }
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata().labels.clone().unwrap_or_default()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }
}

/// Operations tenantctl needs from a cluster
///
/// Writes are individually atomic. `replace` succeeds only when the object's
/// resourceVersion still matches the stored one, otherwise it returns
/// [`GatewayError::Conflict`].
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn get(&self, object: &ObjectRef) -> GatewayResult<ClusterObject>;

    /// List objects of a kind. A namespaced kind with no namespace lists
    /// across all namespaces.
    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> GatewayResult<Vec<ClusterObject>>;

    async fn create(&self, object: ClusterObject) -> GatewayResult<ClusterObject>;

    /// Conditional replace keyed on metadata.resourceVersion
    async fn replace(&self, object: ClusterObject) -> GatewayResult<ClusterObject>;

    /// Request deletion. The object may stay observable for a while.
    async fn delete(&self, object: &ObjectRef) -> GatewayResult<()>;

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        tail_lines: Option<i64>,
    ) -> GatewayResult<String>;

    /// Namespace of the identity the gateway authenticates as, if known
    fn caller_namespace(&self) -> Option<String> {
        None
    }

    /// Wait until `object` is no longer observable
    ///
    /// The default implementation polls `get` every `poll_interval`.
    /// Errors other than not-found end the wait.
    async fn await_removal(&self, object: &ObjectRef, poll_interval: Duration) -> GatewayResult<()> {
        loop {
            match self.get(object).await {
                Ok(_) => tokio::time::sleep(poll_interval).await,
                Err(GatewayError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fetch an object and convert it to its concrete type
pub async fn get_typed<T>(gateway: &dyn ClusterGateway, object: &ObjectRef) -> GatewayResult<T>
where
    T: TryFrom<ClusterObject, Error = GatewayError>,
{
    gateway.get(object).await.and_then(T::try_from)
}

/// List objects of a kind and convert them to their concrete type
pub async fn list_typed<T>(
    gateway: &dyn ClusterGateway,
    kind: ObjectKind,
    namespace: Option<&str>,
    label_selector: Option<&str>,
) -> GatewayResult<Vec<T>>
where
    T: TryFrom<ClusterObject, Error = GatewayError>,
{
    gateway
        .list(kind, namespace, label_selector)
        .await?
        .into_iter()
        .map(T::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::namespace("acme-n1").to_string(), "namespace acme-n1");
        assert_eq!(ObjectRef::pod("acme-n1", "web").to_string(), "pod acme-n1/web");
    }

    #[test]
    fn test_object_ref_from_object_drops_namespace_for_cluster_kinds() {
        let mut ns = Namespace::default();
        ns.metadata.name = Some("acme-n1".to_string());
        ns.metadata.namespace = Some("ignored".to_string());

        let object = ClusterObject::from(ns);
        assert_eq!(object.object_ref(), ObjectRef::namespace("acme-n1"));
    }

    #[test]
    fn test_try_from_wrong_kind() {
        let object = ClusterObject::from(Pod::default());
        let err = Secret::try_from(object).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::UnexpectedKind {
                expected: ObjectKind::Secret,
                actual: ObjectKind::Pod
            }
        ));
    }
}
