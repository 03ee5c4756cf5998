//! In-memory cluster gateway
//!
//! Holds objects in a map and mimics the API server behavior tenantctl
//! depends on:
//! - every write bumps metadata.resourceVersion and stale replaces conflict
//! - deleted objects can stay observable for a number of reads
//! - deleting a namespace removes the objects inside it
//! - a token controller attaches a secret to new ServiceAccounts
//!
//! Failures can be injected per object, and every call is recorded in order.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, ObjectReference};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ClusterGateway, ClusterObject, GatewayError, GatewayResult, ObjectKind, ObjectRef};

/// A call observed by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Get(ObjectRef),
    List(ObjectKind, Option<String>),
    Create(ObjectRef),
    Replace(ObjectRef),
    Delete(ObjectRef),
    Logs(ObjectRef),
}

/// Mutation applied to a stored object just before a replace is evaluated
type Interference = Box<dyn FnOnce(&mut ClusterObject) + Send>;

#[derive(Default)]
struct Faults {
    get: BTreeSet<ObjectRef>,
    create: BTreeSet<ObjectRef>,
    delete: BTreeSet<ObjectRef>,
    list: BTreeSet<ObjectKind>,
    interference: BTreeMap<ObjectRef, Vec<Interference>>,
    /// Reads that still observe an object after delete; `None` is forever
    linger: BTreeMap<ObjectRef, Option<u32>>,
}

struct MemoryState {
    objects: BTreeMap<ObjectRef, ClusterObject>,
    terminating: BTreeMap<ObjectRef, Option<u32>>,
    logs: BTreeMap<ObjectRef, String>,
    pending_tokens: BTreeMap<ObjectRef, u32>,
    token_delay: Option<u32>,
    caller_namespace: Option<String>,
    next_version: u64,
    calls: Vec<GatewayCall>,
    faults: Faults,
}

/// Cluster gateway that keeps everything in process memory
pub struct InMemoryGateway {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Empty cluster holding only the `default` namespace
    pub fn new() -> Self {
        let gateway = Self {
            state: Mutex::new(MemoryState {
                objects: BTreeMap::new(),
                terminating: BTreeMap::new(),
                logs: BTreeMap::new(),
                pending_tokens: BTreeMap::new(),
                token_delay: Some(0),
                caller_namespace: None,
                next_version: 1,
                calls: Vec::new(),
                faults: Faults::default(),
            }),
        };
        gateway.add_namespace("default");
        gateway
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Namespace reported as the caller's identity namespace
    pub fn with_caller_namespace(self, namespace: &str) -> Self {
        self.state().caller_namespace = Some(namespace.to_string());
        self
    }

    /// Reads of a new ServiceAccount before its token secret appears.
    /// `None` means the token controller never runs.
    pub fn with_token_delay(self, reads: Option<u32>) -> Self {
        self.state().token_delay = reads;
        self
    }

    /// Store an object directly, bypassing faults and the call log
    pub fn seed(&self, object: impl Into<ClusterObject>) -> ClusterObject {
        let mut state = self.state();
        let mut object = object.into();
        state.stamp(&mut object);
        state.objects.insert(object.object_ref(), object.clone());
        object
    }

    pub fn add_namespace(&self, name: &str) {
        let mut namespace = Namespace::default();
        namespace.metadata.name = Some(name.to_string());
        self.seed(namespace);
    }

    pub fn add_node(&self, name: &str, labels: &[(&str, &str)]) {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node.metadata.labels = if labels.is_empty() {
            None
        } else {
            Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        };
        self.seed(node);
    }

    pub fn set_pod_logs(&self, namespace: &str, name: &str, logs: &str) {
        self.state()
            .logs
            .insert(ObjectRef::pod(namespace, name), logs.to_string());
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    pub fn fail_get(&self, object: ObjectRef) {
        self.state().faults.get.insert(object);
    }

    pub fn fail_create(&self, object: ObjectRef) {
        self.state().faults.create.insert(object);
    }

    pub fn fail_delete(&self, object: ObjectRef) {
        self.state().faults.delete.insert(object);
    }

    pub fn fail_list(&self, kind: ObjectKind) {
        self.state().faults.list.insert(kind);
    }

    /// Make the next `times` replaces of `object` lose a race with another writer
    pub fn conflict_on_replace(&self, object: ObjectRef, times: u32) {
        let mut state = self.state();
        let queue = state.faults.interference.entry(object).or_default();
        for _ in 0..times {
            queue.push(Box::new(|_| {}));
        }
    }

    /// Apply `mutation` as a concurrent write right before the next replace
    pub fn interfere_on_replace<F>(&self, object: ObjectRef, mutation: F)
    where
        F: FnOnce(&mut ClusterObject) + Send + 'static,
    {
        self.state()
            .faults
            .interference
            .entry(object)
            .or_default()
            .push(Box::new(mutation));
    }

    /// Keep `object` observable for `reads` gets after it is deleted
    pub fn linger_after_delete(&self, object: ObjectRef, reads: u32) {
        self.state().faults.linger.insert(object, Some(reads));
    }

    /// Accept deletes of `object` but never let it disappear
    pub fn never_remove(&self, object: ObjectRef) {
        self.state().faults.linger.insert(object, None);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Objects a delete was issued for, in call order
    pub fn deletes(&self) -> Vec<ObjectRef> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Delete(object) => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    /// Objects created, in call order
    pub fn creates(&self) -> Vec<ObjectRef> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Create(object) => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.state().objects.contains_key(object)
    }

    /// Current stored state of an object, without counting as a read
    pub fn object(&self, object: &ObjectRef) -> Option<ClusterObject> {
        self.state().objects.get(object).cloned()
    }

    pub fn objects_of(&self, kind: ObjectKind) -> Vec<ClusterObject> {
        self.state()
            .objects
            .values()
            .filter(|o| o.kind() == kind)
            .cloned()
            .collect()
    }
}

impl MemoryState {
    fn stamp(&mut self, object: &mut ClusterObject) {
        let version = self.next_version;
        self.next_version += 1;

        let metadata = object.metadata_mut();
        metadata.resource_version = Some(version.to_string());
        if metadata.uid.is_none() {
            metadata.uid = Some(format!("{:08x}-0000-4000-8000-000000000000", version));
        }
    }

    /// Read an object, advancing deletion and token controller progress
    fn observe(&mut self, object: &ObjectRef) -> GatewayResult<ClusterObject> {
        if let Some(remaining) = self.terminating.get_mut(object) {
            match remaining {
                Some(0) => {
                    self.remove_now(object);
                    return Err(GatewayError::NotFound(object.clone()));
                }
                Some(n) => *n -= 1,
                None => {}
            }
        }

        if let Some(reads) = self.pending_tokens.get_mut(object) {
            if *reads == 0 {
                self.pending_tokens.remove(object);
                self.attach_token(object);
            } else {
                *reads -= 1;
            }
        }

        self.objects
            .get(object)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(object.clone()))
    }

    fn attach_token(&mut self, object: &ObjectRef) {
        let Some(ClusterObject::ServiceAccount(mut account)) = self.objects.get(object).cloned()
        else {
            return;
        };

        account.secrets = Some(vec![ObjectReference {
            name: Some(format!("{}-token", object.name)),
            namespace: object.namespace.clone(),
            ..Default::default()
        }]);

        let mut updated = ClusterObject::from(account);
        self.stamp(&mut updated);
        self.objects.insert(object.clone(), updated);
    }

    fn remove_now(&mut self, object: &ObjectRef) {
        self.objects.remove(object);
        self.terminating.remove(object);
        self.logs.remove(object);
        self.pending_tokens.remove(object);

        if object.kind == ObjectKind::Namespace {
            let contained: Vec<ObjectRef> = self
                .objects
                .keys()
                .filter(|r| r.namespace.as_deref() == Some(object.name.as_str()))
                .cloned()
                .collect();
            for inner in contained {
                self.remove_now(&inner);
            }
        }
    }

    fn namespace_exists(&self, namespace: &str) -> bool {
        let key = ObjectRef::namespace(namespace);
        self.objects.contains_key(&key) && !self.terminating.contains_key(&key)
    }
}

fn injected(operation: &str, object: &ObjectRef) -> GatewayError {
    GatewayError::Unavailable(format!("injected {} failure on {}", operation, object))
}

/// Evaluate a label selector of `key`, `!key`, `key=value` and `key!=value` terms
pub fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else if let Some(key) = term.strip_prefix('!') {
                !labels.contains_key(key.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn get(&self, object: &ObjectRef) -> GatewayResult<ClusterObject> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Get(object.clone()));

        if state.faults.get.contains(object) {
            return Err(injected("get", object));
        }
        state.observe(object)
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> GatewayResult<Vec<ClusterObject>> {
        let mut state = self.state();
        state
            .calls
            .push(GatewayCall::List(kind, namespace.map(String::from)));

        if state.faults.list.contains(&kind) {
            return Err(GatewayError::Unavailable(format!(
                "injected list failure on {}",
                kind
            )));
        }

        Ok(state
            .objects
            .iter()
            .filter(|(r, _)| r.kind == kind)
            .filter(|(r, _)| namespace.is_none() || r.namespace.as_deref() == namespace)
            .filter(|(_, o)| label_selector.map_or(true, |s| selector_matches(s, &o.labels())))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create(&self, object: ClusterObject) -> GatewayResult<ClusterObject> {
        let mut state = self.state();
        let mut object = object;
        if !object.kind().is_namespaced() {
            object.metadata_mut().namespace = None;
        }
        let target = object.object_ref();
        state.calls.push(GatewayCall::Create(target.clone()));

        if state.faults.create.contains(&target) {
            return Err(injected("create", &target));
        }
        if target.name.is_empty() {
            return Err(GatewayError::InvalidRequest(format!(
                "{} has no name",
                target.kind
            )));
        }
        if let Some(ns) = target.namespace.as_deref() {
            if !state.namespace_exists(ns) {
                return Err(GatewayError::NotFound(ObjectRef::namespace(ns)));
            }
        } else if target.kind.is_namespaced() {
            return Err(GatewayError::InvalidRequest(format!(
                "{} requires a namespace",
                target
            )));
        }
        if state.objects.contains_key(&target) {
            return Err(GatewayError::AlreadyExists(target));
        }

        state.stamp(&mut object);
        state.objects.insert(target.clone(), object.clone());

        if target.kind == ObjectKind::ServiceAccount {
            match state.token_delay {
                Some(0) => {
                    state.attach_token(&target);
                    if let Some(stored) = state.objects.get(&target) {
                        object = stored.clone();
                    }
                }
                Some(reads) => {
                    state.pending_tokens.insert(target, reads);
                }
                None => {}
            }
        }

        Ok(object)
    }

    async fn replace(&self, object: ClusterObject) -> GatewayResult<ClusterObject> {
        let mut state = self.state();
        let target = object.object_ref();
        state.calls.push(GatewayCall::Replace(target.clone()));

        let interference = state
            .faults
            .interference
            .get_mut(&target)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));
        if let Some(mutate) = interference {
            if let Some(mut stored) = state.objects.get(&target).cloned() {
                mutate(&mut stored);
                state.stamp(&mut stored);
                state.objects.insert(target.clone(), stored);
            }
        }

        let stored_version = match state.objects.get(&target) {
            Some(stored) => stored.resource_version().map(String::from),
            None => return Err(GatewayError::NotFound(target)),
        };
        if let Some(version) = object.resource_version() {
            if Some(version) != stored_version.as_deref() {
                return Err(GatewayError::Conflict(target));
            }
        }

        let mut object = object;
        state.stamp(&mut object);
        state.objects.insert(target, object.clone());
        Ok(object)
    }

    async fn delete(&self, object: &ObjectRef) -> GatewayResult<()> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Delete(object.clone()));

        if state.faults.delete.contains(object) {
            return Err(injected("delete", object));
        }
        if !state.objects.contains_key(object) {
            return Err(GatewayError::NotFound(object.clone()));
        }
        if state.terminating.contains_key(object) {
            return Ok(());
        }

        match state.faults.linger.get(object).copied() {
            Some(reads) => {
                state.terminating.insert(object.clone(), reads);
            }
            None => state.remove_now(object),
        }
        Ok(())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        tail_lines: Option<i64>,
    ) -> GatewayResult<String> {
        let mut state = self.state();
        let pod = ObjectRef::pod(namespace, name);
        state.calls.push(GatewayCall::Logs(pod.clone()));

        if !state.objects.contains_key(&pod) {
            return Err(GatewayError::NotFound(pod));
        }

        let logs = state.logs.get(&pod).cloned().unwrap_or_default();
        Ok(match tail_lines {
            Some(n) if n >= 0 => {
                let lines: Vec<&str> = logs.lines().collect();
                let start = lines.len().saturating_sub(n as usize);
                lines[start..].join("\n")
            }
            _ => logs,
        })
    }

    fn caller_namespace(&self) -> Option<String> {
        self.state().caller_namespace.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::get_typed;
    use k8s_openapi::api::core::v1::{Pod, ServiceAccount};
    use std::time::Duration;

    fn pod(namespace: &str, name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(namespace.to_string());
        pod
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_terms() {
        let l = labels(&[("a", "1"), ("b", "2")]);
        assert!(selector_matches("a", &l));
        assert!(selector_matches("a=1,b==2", &l));
        assert!(selector_matches("a!=2,!c", &l));
        assert!(!selector_matches("c", &l));
        assert!(!selector_matches("a=2", &l));
        assert!(selector_matches("", &l));
    }

    #[tokio::test]
    async fn test_create_requires_existing_namespace() {
        let gateway = InMemoryGateway::new();
        let err = gateway.create(pod("nowhere", "p1").into()).await.unwrap_err();
        assert!(err.is_not_found());

        gateway.add_namespace("acme-n1");
        gateway.create(pod("acme-n1", "p1").into()).await.unwrap();
        let err = gateway.create(pod("acme-n1", "p1").into()).await.unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let gateway = InMemoryGateway::new();
        gateway.add_namespace("acme-n1");
        let created = gateway.create(pod("acme-n1", "p1").into()).await.unwrap();

        let fresh = gateway.replace(created.clone()).await.unwrap();
        assert_ne!(fresh.resource_version(), created.resource_version());

        let err = gateway.replace(created).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_lingering_delete_is_observed_until_removed() {
        let gateway = InMemoryGateway::new();
        gateway.add_namespace("acme-n1");
        let target = ObjectRef::pod("acme-n1", "p1");
        gateway.seed(pod("acme-n1", "p1"));
        gateway.linger_after_delete(target.clone(), 2);

        gateway.delete(&target).await.unwrap();
        assert!(gateway.get(&target).await.is_ok());
        assert!(gateway.get(&target).await.is_ok());
        assert!(gateway.get(&target).await.unwrap_err().is_not_found());

        gateway.add_namespace("acme-n2");
        gateway.seed(pod("acme-n2", "p2"));
        gateway.linger_after_delete(ObjectRef::pod("acme-n2", "p2"), 3);
        gateway
            .await_removal(&ObjectRef::pod("acme-n2", "p2"), Duration::from_millis(1))
            .await
            .unwrap_or_else(|e| panic!("unexpected {}", e));
    }

    #[tokio::test]
    async fn test_namespace_delete_cascades() {
        let gateway = InMemoryGateway::new();
        gateway.add_namespace("acme-n1");
        gateway.seed(pod("acme-n1", "p1"));

        gateway.delete(&ObjectRef::namespace("acme-n1")).await.unwrap();
        assert!(!gateway.contains(&ObjectRef::pod("acme-n1", "p1")));
    }

    #[tokio::test]
    async fn test_token_controller_delay() {
        let gateway = InMemoryGateway::new().with_token_delay(Some(1));
        let mut account = ServiceAccount::default();
        account.metadata.name = Some("acme-user".to_string());
        account.metadata.namespace = Some("default".to_string());
        gateway.create(account.into()).await.unwrap();

        let target = ObjectRef::service_account("default", "acme-user");
        let first: ServiceAccount = get_typed(&gateway, &target).await.unwrap();
        assert!(first.secrets.is_none());
        let second: ServiceAccount = get_typed(&gateway, &target).await.unwrap();
        assert_eq!(second.secrets.map(|s| s.len()), Some(1));
    }
}
