//! Default target resolution
//!
//! An explicit `--tenant` / `--target` always wins. Otherwise the tenant is
//! derived from the caller's namespace and the target is the tenant's stored
//! default, as long as that default is still granted.

use serde::{Deserialize, Serialize};
use tenantctl_common::{naming, TargetScope};
use tracing::{debug, instrument, warn};

use super::AccessGrantStore;
use crate::error::{TenancyError, TenancyResult};

/// The tenant and target a command operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant: String,
    pub target: String,
    /// Tenant-target namespace
    pub namespace: String,
}

impl TenantContext {
    pub fn new(tenant: &str, target: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            target: target.to_string(),
            namespace: naming::tenant_target_namespace(tenant, target),
        }
    }
}

#[derive(Clone)]
pub struct DefaultTargetResolver {
    grants: AccessGrantStore,
    caller_namespace: Option<String>,
}

impl DefaultTargetResolver {
    pub fn new(grants: AccessGrantStore, caller_namespace: Option<String>) -> Self {
        Self {
            grants,
            caller_namespace,
        }
    }

    /// Effective tenant name
    pub fn resolve_tenant(&self, explicit: Option<&str>) -> TenancyResult<String> {
        let tenant = match explicit {
            Some(tenant) => tenant.to_string(),
            None => {
                let namespace = self.caller_namespace.as_deref().ok_or_else(|| {
                    TenancyError::validation("no tenant given and the caller namespace is unknown")
                })?;
                let tenant = naming::tenant_from_namespace(namespace).ok_or_else(|| {
                    TenancyError::validation(format!(
                        "cannot derive a tenant from namespace '{}', pass --tenant",
                        namespace
                    ))
                })?;
                debug!(namespace = %namespace, tenant = %tenant, "Tenant derived from caller");
                tenant.to_string()
            }
        };

        naming::validate_tenant_name(&tenant)?;
        Ok(tenant)
    }

    /// Effective target name for `tenant`
    ///
    /// A stored default that is no longer granted is treated as absent.
    pub async fn resolve_target(&self, tenant: &str, explicit: Option<&str>) -> TenancyResult<String> {
        if let Some(target) = explicit {
            naming::validate_target_name(target)?;
            return Ok(target.to_string());
        }

        let snapshot = self.grants.snapshot(tenant).await?;
        match snapshot.default_target {
            Some(target) if snapshot.table.contains(&target) => Ok(target),
            Some(target) => {
                warn!(tenant = %tenant, target = %target, "Stored default target is not granted");
                Err(TenancyError::validation(format!(
                    "default target '{}' of tenant '{}' is no longer granted, pass --target",
                    target, tenant
                )))
            }
            None => Err(TenancyError::validation(format!(
                "tenant '{}' has no default target, pass --target",
                tenant
            ))),
        }
    }

    pub async fn resolve(
        &self,
        tenant: Option<&str>,
        target: Option<&str>,
    ) -> TenancyResult<TenantContext> {
        let tenant = self.resolve_tenant(tenant)?;
        let target = self.resolve_target(&tenant, target).await?;
        Ok(TenantContext::new(&tenant, &target))
    }

    /// Change the default target; it must already be granted
    #[instrument(skip(self))]
    pub async fn update_default(&self, tenant: &str, target: &str) -> TenancyResult<()> {
        if !self
            .grants
            .is_valid_target(target, &TargetScope::Tenant(tenant.to_string()))
            .await
        {
            return Err(TenancyError::authorization(tenant, target));
        }

        self.grants.set_default_target(tenant, target).await
    }
}
