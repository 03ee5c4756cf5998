//! Lifecycle Tests
//! Tenant and tenant-target creation, cascading deletion and target groups

mod common;

use common::*;
use k8s_openapi::api::core::v1::{Node, ResourceQuota};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use std::sync::Arc;
use tenantctl_common::{QuotaSpec, QuotaUpdate, Target, TargetScope};
use tenantctl_core::kubernetes::memory::InMemoryGateway;
use tenantctl_core::kubernetes::types::Readiness;
use tenantctl_core::lifecycle::{FailurePolicy, PolicyChange};
use tenantctl_core::tenancy::identity_ref;
use tenantctl_core::{ObjectKind, ObjectRef, TenancyError};

fn identity(tenant: &str) -> ObjectRef {
    identity_ref(TENANT_NAMESPACE, tenant)
}

// ============== Tenant Tests ==============

#[tokio::test]
async fn test_create_tenant_is_ready_once_token_appears() {
    let gateway = Arc::new(InMemoryGateway::new().with_token_delay(Some(2)));
    let services = services(&gateway);

    let readiness = services.lifecycle.create_tenant("acme").await.unwrap();
    assert_eq!(readiness, Readiness::Ready);

    let kinds: Vec<ObjectKind> = gateway.creates().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![ObjectKind::ServiceAccount, ObjectKind::Role, ObjectKind::RoleBinding]
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_tenant_reports_not_ready() {
    let gateway = Arc::new(InMemoryGateway::new().with_token_delay(None));
    let services = services(&gateway);

    let readiness = services.lifecycle.create_tenant("acme").await.unwrap();

    assert_eq!(readiness, Readiness::NotReady { attempts: 3 });
    assert!(gateway.contains(&identity("acme")));
}

#[tokio::test]
async fn test_list_and_get_tenants() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1"]).await;
    tenant_with_targets(&services, "globex", &[]).await;

    let tenants = services.lifecycle.list_tenants().await.unwrap();
    let names: Vec<&str> = tenants.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["acme", "globex"]);

    let acme = services.lifecycle.get_tenant("acme").await.unwrap();
    assert_eq!(acme.default_target.as_deref(), Some("n1"));
    assert!(acme.credentials_ready);
}

#[tokio::test]
async fn test_tenant_name_is_validated() {
    let gateway = create_test_cluster();
    let services = services(&gateway);

    let err = services.lifecycle.create_tenant("Bad-Name").await.unwrap_err();
    assert!(matches!(err, TenancyError::Validation(_)));
    assert!(gateway.creates().is_empty());
}

// ============== Tenant-Target Tests ==============

#[tokio::test]
async fn test_tenant_target_objects_are_created_in_order() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &[]).await;
    services.grants.grant_target("acme", "gpu").await.unwrap();
    gateway.clear_calls();

    let info = services
        .lifecycle
        .create_tenant_target("acme", "gpu", None)
        .await
        .unwrap();

    let kinds: Vec<ObjectKind> = gateway.creates().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ObjectKind::Namespace,
            ObjectKind::ResourceQuota,
            ObjectKind::Role,
            ObjectKind::RoleBinding,
            ObjectKind::NetworkPolicy,
        ]
    );
    assert_eq!(info.namespace, "acme-gpu");
    assert_eq!(info.node_selector.as_deref(), Some("tenantctl.group/gpu=true"));
    assert_eq!(info.pod_count, Some(0));
    assert_eq!(
        info.quota.unwrap().cpu.limit.as_deref(),
        Some(QuotaSpec::default().cpu.as_str())
    );
}

#[tokio::test]
async fn test_tenant_target_requires_grant() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &[]).await;
    gateway.clear_calls();

    let err = services
        .lifecycle
        .create_tenant_target("acme", "n2", None)
        .await
        .unwrap_err();

    assert!(matches!(err, TenancyError::Authorization { .. }));
    assert!(gateway.creates().is_empty());
}

#[tokio::test]
async fn test_invalid_quota_creates_nothing() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &[]).await;
    services.grants.grant_target("acme", "n1").await.unwrap();
    gateway.clear_calls();

    let quota = QuotaSpec {
        cpu: "lots".to_string(),
        ..QuotaSpec::default()
    };
    let err = services
        .lifecycle
        .create_tenant_target("acme", "n1", Some(&quota))
        .await
        .unwrap_err();

    assert!(matches!(err, TenancyError::Validation(_)));
    assert!(gateway.creates().is_empty());
}

#[tokio::test]
async fn test_list_tenant_targets_without_quota() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1", "gpu"]).await;

    let quota = ObjectRef::namespaced(ObjectKind::ResourceQuota, "acme-n1", "acme-n1-limits");
    let mut extra: ResourceQuota = gateway.object(&quota).unwrap().try_into().unwrap();
    extra.metadata.name = Some("extra".to_string());
    extra.metadata.resource_version = None;
    gateway.seed(extra);

    let targets = services.lifecycle.list_tenant_targets("acme").await.unwrap();
    let n1 = targets.iter().find(|t| t.target == "n1").unwrap();
    let gpu = targets.iter().find(|t| t.target == "gpu").unwrap();
    assert!(n1.quota.is_none());
    assert!(gpu.quota.is_some());
}

#[tokio::test]
async fn test_update_tenant_target() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1"]).await;

    let update = QuotaUpdate {
        cpu: Some("500m".to_string()),
        ..QuotaUpdate::default()
    };
    let change = services
        .lifecycle
        .update_tenant_target("acme", "n1", &update)
        .await
        .unwrap();
    assert_eq!(change, PolicyChange::Replaced);

    let quota: ResourceQuota = gateway
        .object(&ObjectRef::namespaced(
            ObjectKind::ResourceQuota,
            "acme-n1",
            "acme-n1-limits",
        ))
        .unwrap()
        .try_into()
        .unwrap();
    let hard = quota.spec.unwrap().hard.unwrap();
    assert_eq!(hard["limits.cpu"].0, "500m");
    assert_eq!(hard["limits.memory"].0, QuotaSpec::default().memory);
}

#[tokio::test]
async fn test_update_skips_ambiguous_network_policies() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1"]).await;

    let mut extra = NetworkPolicy::default();
    extra.metadata.name = Some("extra".to_string());
    extra.metadata.namespace = Some("acme-n1".to_string());
    gateway.seed(extra);

    let change = services
        .lifecycle
        .update_tenant_target("acme", "n1", &QuotaUpdate::default())
        .await
        .unwrap();
    assert_eq!(
        change,
        PolicyChange::Skipped { found: 2 }
    );
}

// ============== Cascade Tests ==============

#[tokio::test]
async fn test_tenant_delete_waits_for_tenant_targets() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1", "gpu"]).await;
    gateway.linger_after_delete(ObjectRef::namespace("acme-n1"), 3);
    gateway.clear_calls();

    let results = services.lifecycle.delete_tenants(&names(&["acme"])).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_success(), "{:?}", results[0].failures());
    assert_eq!(results[0].targets.len(), 2);

    let deletes = gateway.deletes();
    let identity_at = deletes.iter().position(|r| *r == identity("acme")).unwrap();
    for namespace in ["acme-n1", "acme-gpu"] {
        let at = deletes
            .iter()
            .position(|r| *r == ObjectRef::namespace(namespace))
            .unwrap();
        assert!(at < identity_at);
        assert!(!gateway.contains(&ObjectRef::namespace(namespace)));
    }
    assert!(!gateway.contains(&identity("acme")));
}

#[tokio::test]
async fn test_failed_tenant_target_keeps_tenant() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1", "gpu"]).await;
    gateway.fail_delete(ObjectRef::namespace("acme-gpu"));
    gateway.clear_calls();

    let results = services.lifecycle.delete_tenants(&names(&["acme"])).await;

    let deletion = &results[0];
    assert!(!deletion.is_success());
    assert!(deletion.error.is_some());
    assert!(!gateway.deletes().contains(&identity("acme")));
    assert!(gateway.contains(&identity("acme")));

    // The sibling was still torn down and revoked
    assert!(!gateway.contains(&ObjectRef::namespace("acme-n1")));
    let grants = services.grants.grants("acme").await.unwrap();
    assert!(!grants.contains("n1"));
    assert!(grants.contains("gpu"));
}

#[tokio::test]
async fn test_best_effort_parent_deletes_tenant_anyway() {
    let gateway = create_test_cluster();
    let mut config = test_config();
    config.lifecycle.parent_policy = FailurePolicy::BestEffort;
    let services = services_with(&gateway, config);
    tenant_with_targets(&services, "acme", &["n1"]).await;
    gateway.fail_delete(ObjectRef::namespace("acme-n1"));

    let results = services.lifecycle.delete_tenants(&names(&["acme"])).await;

    assert!(results[0].error.is_none());
    assert!(!results[0].targets.is_success());
    assert!(!gateway.contains(&identity("acme")));
}

#[tokio::test]
async fn test_tenants_are_deleted_independently() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1"]).await;

    let results = services
        .lifecycle
        .delete_tenants(&names(&["ghost", "acme"]))
        .await;

    assert!(results[0].error.is_some());
    assert!(results[1].is_success());
}

#[tokio::test]
async fn test_wide_tenant_delete_revokes_every_grant() {
    let gateway = create_test_cluster();
    let workers = add_worker_nodes(&gateway, 8);
    let services = yielding_services(&gateway);
    services.lifecycle.create_tenant("acme").await.unwrap();
    for worker in &workers {
        services.grants.grant_target("acme", worker).await.unwrap();
    }

    let results = services.lifecycle.delete_tenants(&names(&["acme"])).await;

    assert!(results[0].is_success(), "{:?}", results[0].failures());
    assert_eq!(results[0].targets.len(), 8);
    assert!(!gateway.contains(&identity("acme")));
}

#[tokio::test]
async fn test_wide_tenant_target_delete_leaves_no_grants() {
    let gateway = create_test_cluster();
    let workers = add_worker_nodes(&gateway, 8);
    let services = yielding_services(&gateway);
    let targets: Vec<&str> = workers.iter().map(String::as_str).collect();
    tenant_with_targets(&services, "acme", &targets).await;

    let report = services
        .lifecycle
        .delete_tenant_targets("acme", &workers)
        .await;

    assert!(report.is_success(), "{:?}", report.messages());
    assert!(services.grants.grants("acme").await.unwrap().is_empty());
    assert_eq!(services.grants.default_target("acme").await.unwrap(), None);
    for worker in &workers {
        let namespace = format!("acme-{}", worker);
        assert!(!gateway.contains(&ObjectRef::namespace(&namespace)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_stuck_namespace_times_out() {
    let gateway = create_test_cluster();
    let mut config = test_config();
    config.lifecycle.deletion_timeout_secs = 1;
    let services = services_with(&gateway, config);
    tenant_with_targets(&services, "acme", &["n1"]).await;
    gateway.never_remove(ObjectRef::namespace("acme-n1"));

    let report = services
        .lifecycle
        .delete_tenant_targets("acme", &names(&["n1"]))
        .await;

    let messages = report.messages();
    assert!(messages[0].contains("still present"), "{}", messages[0]);
    assert!(services.grants.grants("acme").await.unwrap().contains("n1"));
}

#[tokio::test]
async fn test_deleting_ungranted_tenant_target_is_refused() {
    let gateway = create_test_cluster();
    let services = services(&gateway);
    tenant_with_targets(&services, "acme", &["n1"]).await;
    gateway.clear_calls();

    let report = services
        .lifecycle
        .delete_tenant_targets("acme", &names(&["n2"]))
        .await;

    assert!(!report.is_success());
    assert!(gateway.deletes().is_empty());
}

// ============== Target Group Tests ==============

#[tokio::test]
async fn test_set_and_delete_target_group() {
    let gateway = create_test_cluster();
    let services = services(&gateway);

    let members = services
        .lifecycle
        .set_target_group("fast", &names(&["n1"]))
        .await
        .unwrap();
    assert_eq!(members, vec!["n1".to_string()]);

    let n2: Node = gateway
        .object(&ObjectRef::cluster(ObjectKind::Node, "n2"))
        .unwrap()
        .try_into()
        .unwrap();
    assert_eq!(
        n2.metadata.labels.unwrap().get("tenantctl.group/fast").map(String::as_str),
        Some("false")
    );
    let targets = services.catalog.list_targets(&TargetScope::All).await.unwrap();
    assert!(targets.contains(&Target::group("fast")));

    services.lifecycle.delete_target_group("fast").await.unwrap();
    let targets = services.catalog.list_targets(&TargetScope::All).await.unwrap();
    assert!(!targets.contains(&Target::group("fast")));
    for node in gateway.objects_of(ObjectKind::Node) {
        assert!(!node.labels().contains_key("tenantctl.group/fast"));
    }
}

#[tokio::test]
async fn test_target_group_name_must_be_new() {
    let gateway = create_test_cluster();
    let services = services(&gateway);

    for existing in ["gpu", "n1"] {
        let err = services
            .lifecycle
            .set_target_group(existing, &names(&["n1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Validation(_)));
    }

    let err = services
        .lifecycle
        .set_target_group("fast", &names(&["n9"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TenancyError::Validation(_)));
}

#[tokio::test]
async fn test_only_groups_can_be_deleted() {
    let gateway = create_test_cluster();
    let services = services(&gateway);

    let err = services.lifecycle.delete_target_group("n1").await.unwrap_err();
    assert!(matches!(err, TenancyError::Validation(_)));
}
