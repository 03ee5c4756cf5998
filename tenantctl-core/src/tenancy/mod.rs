//! Tenant access model
//!
//! - [`catalog::TargetCatalog`] enumerates targets from cluster topology
//! - [`grants::AccessGrantStore`] keeps the tenant↔target relation and the
//!   default target as labels on the tenant identity
//! - [`resolver::DefaultTargetResolver`] picks the tenant and target a
//!   command applies to

pub mod catalog;
pub mod grants;
pub mod resolver;

pub use catalog::TargetCatalog;
pub use grants::{AccessGrantStore, GrantSnapshot};
pub use resolver::{DefaultTargetResolver, TenantContext};

use k8s_openapi::api::core::v1::ServiceAccount;
use tenantctl_common::naming;

use crate::error::TenancyResult;
use crate::kubernetes::{get_typed, ClusterGateway, ObjectRef};

/// Reference to a tenant's identity object
pub fn identity_ref(tenant_namespace: &str, tenant: &str) -> ObjectRef {
    ObjectRef::service_account(tenant_namespace, &naming::tenant_identity(tenant))
}

pub(crate) async fn fetch_identity(
    gateway: &dyn ClusterGateway,
    tenant_namespace: &str,
    tenant: &str,
) -> TenancyResult<ServiceAccount> {
    Ok(get_typed(gateway, &identity_ref(tenant_namespace, tenant)).await?)
}
