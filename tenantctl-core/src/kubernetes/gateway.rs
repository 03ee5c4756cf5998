//! kube-rs backed cluster gateway

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Namespace, Node, Pod, ResourceQuota, Secret, ServiceAccount,
};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::Resource;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use super::client::K8sClient;
use super::{ClusterGateway, ClusterObject, GatewayError, GatewayResult, ObjectKind, ObjectRef};

/// Dispatch on an [`ObjectKind`] to a typed `Api`
macro_rules! with_api {
    ($gateway:expr, $kind:expr, $namespace:expr, |$api:ident| $body:expr) => {
        match $kind {
            ObjectKind::ServiceAccount => {
                let $api: Api<ServiceAccount> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::Role => {
                let $api: Api<Role> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::RoleBinding => {
                let $api: Api<RoleBinding> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::ResourceQuota => {
                let $api: Api<ResourceQuota> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::NetworkPolicy => {
                let $api: Api<NetworkPolicy> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::Secret => {
                let $api: Api<Secret> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::Pod => {
                let $api: Api<Pod> = $gateway.scoped($namespace);
                $body
            }
            ObjectKind::Namespace => {
                let $api: Api<Namespace> = $gateway.all();
                $body
            }
            ObjectKind::Node => {
                let $api: Api<Node> = $gateway.all();
                $body
            }
        }
    };
}

/// Dispatch on a [`ClusterObject`] to a typed `Api` and the inner object
macro_rules! with_object {
    ($gateway:expr, $object:expr, $namespace:expr, |$api:ident, $inner:ident| $body:expr) => {
        match $object {
            ClusterObject::ServiceAccount($inner) => {
                let $api: Api<ServiceAccount> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::Role($inner) => {
                let $api: Api<Role> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::RoleBinding($inner) => {
                let $api: Api<RoleBinding> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::ResourceQuota($inner) => {
                let $api: Api<ResourceQuota> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::NetworkPolicy($inner) => {
                let $api: Api<NetworkPolicy> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::Secret($inner) => {
                let $api: Api<Secret> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::Pod($inner) => {
                let $api: Api<Pod> = $gateway.scoped($namespace);
                $body
            }
            ClusterObject::Namespace($inner) => {
                let $api: Api<Namespace> = $gateway.all();
                $body
            }
            ClusterObject::Node($inner) => {
                let $api: Api<Node> = $gateway.all();
                $body
            }
        }
    };
}

/// Cluster gateway backed by a live API server
#[derive(Clone, Debug)]
pub struct KubeGateway {
    client: K8sClient,
}

impl KubeGateway {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    /// Namespaced Api, or every namespace when none is given
    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.inner().clone(), ns),
            None => Api::all(self.client.inner().clone()),
        }
    }

    fn all<K>(&self) -> Api<K>
    where
        K: Resource,
        <K as Resource>::DynamicType: Default,
    {
        Api::all(self.client.inner().clone())
    }
}

fn require_namespace(object: &ObjectRef) -> GatewayResult<()> {
    if object.kind.is_namespaced() && object.namespace.is_none() {
        return Err(GatewayError::InvalidRequest(format!(
            "{} requires a namespace",
            object
        )));
    }
    Ok(())
}

/// Wait for an object to be deleted using a watch
async fn await_deleted<K>(api: Api<K>, object: &ObjectRef) -> GatewayResult<()>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
{
    let current = api
        .get_opt(&object.name)
        .await
        .map_err(|e| GatewayError::from_kube(e, object))?;

    let Some(current) = current else {
        return Ok(());
    };

    let uid = current.meta().uid.clone().unwrap_or_default();
    await_condition(api, &object.name, conditions::is_deleted(&uid))
        .await
        .map_err(|e| GatewayError::Watch(e.to_string()))?;

    Ok(())
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get(&self, object: &ObjectRef) -> GatewayResult<ClusterObject> {
        require_namespace(object)?;
        with_api!(self, object.kind, object.namespace.as_deref(), |api| {
            api.get(&object.name)
                .await
                .map(ClusterObject::from)
                .map_err(|e| GatewayError::from_kube(e, object))
        })
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> GatewayResult<Vec<ClusterObject>> {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }

        let target = ObjectRef {
            kind,
            namespace: namespace.map(String::from),
            name: "*".to_string(),
        };

        with_api!(self, kind, namespace, |api| {
            api.list(&lp)
                .await
                .map(|list| list.items.into_iter().map(ClusterObject::from).collect())
                .map_err(|e| GatewayError::from_kube(e, &target))
        })
    }

    async fn create(&self, object: ClusterObject) -> GatewayResult<ClusterObject> {
        let target = object.object_ref();
        require_namespace(&target)?;
        debug!("Creating {}", target);

        let pp = PostParams::default();
        with_object!(self, object, target.namespace.as_deref(), |api, inner| {
            api.create(&pp, &inner)
                .await
                .map(ClusterObject::from)
                .map_err(|e| GatewayError::from_kube(e, &target))
        })
    }

    async fn replace(&self, object: ClusterObject) -> GatewayResult<ClusterObject> {
        let target = object.object_ref();
        require_namespace(&target)?;
        debug!(
            "Replacing {} at resourceVersion {:?}",
            target,
            object.resource_version()
        );

        let pp = PostParams::default();
        with_object!(self, object, target.namespace.as_deref(), |api, inner| {
            api.replace(&target.name, &pp, &inner)
                .await
                .map(ClusterObject::from)
                .map_err(|e| GatewayError::from_kube(e, &target))
        })
    }

    async fn delete(&self, object: &ObjectRef) -> GatewayResult<()> {
        require_namespace(object)?;
        debug!("Deleting {}", object);

        let dp = DeleteParams::default();
        with_api!(self, object.kind, object.namespace.as_deref(), |api| {
            api.delete(&object.name, &dp)
                .await
                .map(|_| ())
                .map_err(|e| GatewayError::from_kube(e, object))
        })
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        tail_lines: Option<i64>,
    ) -> GatewayResult<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.inner().clone(), namespace);

        let mut lp = LogParams::default();
        if let Some(tail) = tail_lines {
            lp.tail_lines = Some(tail);
        }

        pods.logs(name, &lp)
            .await
            .map_err(|e| GatewayError::from_kube(e, &ObjectRef::pod(namespace, name)))
    }

    fn caller_namespace(&self) -> Option<String> {
        Some(self.client.default_namespace().to_string())
    }

    async fn await_removal(&self, object: &ObjectRef, _poll_interval: Duration) -> GatewayResult<()> {
        require_namespace(object)?;
        with_api!(self, object.kind, object.namespace.as_deref(), |api| {
            await_deleted(api, object).await
        })
    }
}
