//! Pods and secrets inside tenant-targets
//!
//! Every operation takes a resolved [`TenantContext`] and refuses to touch
//! a namespace whose target is not granted to the tenant.

use k8s_openapi::api::core::v1::{Pod, Secret};
use tenantctl_common::naming;
use tracing::{debug, info, instrument};

use super::convergence::MissingObject;
use super::fanout::FanOutReport;
use super::LifecycleOrchestrator;
use crate::error::{TenancyError, TenancyResult};
use crate::kubernetes::objects;
use crate::kubernetes::types::{pod_to_info, secret_to_info, PodInfo, PodRequest, SecretInfo};
use crate::kubernetes::{get_typed, list_typed, ObjectKind, ObjectRef};
use crate::tenancy::TenantContext;

impl LifecycleOrchestrator {
    async fn authorize(&self, ctx: &TenantContext) -> TenancyResult<()> {
        self.granted_target(&ctx.tenant, &ctx.target).await.map(|_| ())
    }

    /// Namespaces of the given target, or of every granted target
    async fn workload_namespaces(&self, tenant: &str, target: Option<&str>) -> TenancyResult<Vec<String>> {
        match target {
            Some(target) => {
                self.authorize(&TenantContext::new(tenant, target)).await?;
                Ok(vec![naming::tenant_target_namespace(tenant, target)])
            }
            None => Ok(self
                .grants
                .grants(tenant)
                .await?
                .targets()
                .iter()
                .map(|t| naming::tenant_target_namespace(tenant, &t.name))
                .collect()),
        }
    }

    // ------------------------------------------------------------------
    // Pods
    // ------------------------------------------------------------------

    #[instrument(skip(self, request), fields(pod = %request.name))]
    pub async fn create_pod(&self, ctx: &TenantContext, request: &PodRequest) -> TenancyResult<PodInfo> {
        request.validate()?;
        self.authorize(ctx).await?;

        let created = self
            .gateway
            .create(objects::pod(&ctx.namespace, request).into())
            .await?;
        info!(namespace = %ctx.namespace, pod = %request.name, "Pod created");
        Ok(pod_to_info(Pod::try_from(created)?))
    }

    pub async fn list_pods(&self, tenant: &str, target: Option<&str>) -> TenancyResult<Vec<PodInfo>> {
        let mut pods = Vec::new();
        for namespace in self.workload_namespaces(tenant, target).await? {
            let found: Vec<Pod> =
                list_typed(self.gateway.as_ref(), ObjectKind::Pod, Some(&namespace), None).await?;
            pods.extend(found.into_iter().map(pod_to_info));
        }
        Ok(pods)
    }

    pub async fn get_pod(&self, ctx: &TenantContext, name: &str) -> TenancyResult<PodInfo> {
        self.authorize(ctx).await?;
        let pod: Pod = get_typed(self.gateway.as_ref(), &ObjectRef::pod(&ctx.namespace, name)).await?;
        Ok(pod_to_info(pod))
    }

    pub async fn pod_logs(&self, ctx: &TenantContext, name: &str, tail_lines: Option<i64>) -> TenancyResult<String> {
        self.authorize(ctx).await?;
        Ok(self.gateway.pod_logs(&ctx.namespace, name, tail_lines).await?)
    }

    /// Delete pods concurrently, each confirmed gone before it reports success
    #[instrument(skip(self, ctx), fields(namespace = %ctx.namespace))]
    pub async fn delete_pods(&self, ctx: &TenantContext, names: &[String]) -> TenancyResult<FanOutReport> {
        self.authorize(ctx).await?;
        Ok(self.delete_in_namespace(&ctx.namespace, names, ObjectRef::pod).await)
    }

    // ------------------------------------------------------------------
    // Secrets
    // ------------------------------------------------------------------

    /// Opaque secret that pods can expose as an environment variable
    #[instrument(skip(self, ctx, data))]
    pub async fn create_secret(&self, ctx: &TenantContext, name: &str, data: &str) -> TenancyResult<SecretInfo> {
        naming::validate_object_name(name)?;
        self.authorize(ctx).await?;

        let created = self
            .gateway
            .create(objects::opaque_secret(&ctx.namespace, name, data).into())
            .await?;
        info!(namespace = %ctx.namespace, secret = %name, "Secret created");
        Ok(secret_to_info(Secret::try_from(created)?))
    }

    /// Registry credential; `docker_config` must be a JSON docker config
    #[instrument(skip(self, ctx, docker_config))]
    pub async fn create_deploy_secret(
        &self,
        ctx: &TenantContext,
        name: &str,
        docker_config: Vec<u8>,
    ) -> TenancyResult<SecretInfo> {
        naming::validate_object_name(name)?;
        let parsed: serde_json::Value = serde_json::from_slice(&docker_config)
            .map_err(|e| TenancyError::validation(format!("deploy secret is not valid JSON: {}", e)))?;
        if parsed.get("auths").is_none() {
            return Err(TenancyError::validation(
                "deploy secret has no 'auths' section",
            ));
        }
        self.authorize(ctx).await?;

        let created = self
            .gateway
            .create(objects::deploy_secret(&ctx.namespace, name, docker_config).into())
            .await?;
        info!(namespace = %ctx.namespace, secret = %name, "Deploy secret created");
        Ok(secret_to_info(Secret::try_from(created)?))
    }

    pub async fn get_secret(&self, ctx: &TenantContext, name: &str) -> TenancyResult<SecretInfo> {
        self.authorize(ctx).await?;
        let secret: Secret =
            get_typed(self.gateway.as_ref(), &ObjectRef::secret(&ctx.namespace, name)).await?;
        Ok(secret_to_info(secret))
    }

    pub async fn get_deploy_secret(&self, ctx: &TenantContext, name: &str) -> TenancyResult<SecretInfo> {
        let info = self.get_secret(ctx, name).await?;
        if !info.is_deploy_secret() {
            return Err(TenancyError::validation(format!(
                "secret '{}' is not a deploy secret",
                name
            )));
        }
        Ok(info)
    }

    /// Secrets of one target or of every granted target
    pub async fn list_secrets(&self, tenant: &str, target: Option<&str>) -> TenancyResult<Vec<SecretInfo>> {
        let mut secrets = Vec::new();
        for namespace in self.workload_namespaces(tenant, target).await? {
            let found: Vec<Secret> =
                list_typed(self.gateway.as_ref(), ObjectKind::Secret, Some(&namespace), None).await?;
            secrets.extend(found.into_iter().map(secret_to_info));
        }
        Ok(secrets)
    }

    #[instrument(skip(self, ctx), fields(namespace = %ctx.namespace))]
    pub async fn delete_secrets(&self, ctx: &TenantContext, names: &[String]) -> TenancyResult<FanOutReport> {
        self.authorize(ctx).await?;
        Ok(self.delete_in_namespace(&ctx.namespace, names, ObjectRef::secret).await)
    }

    async fn delete_in_namespace(
        &self,
        namespace: &str,
        names: &[String],
        reference: fn(&str, &str) -> ObjectRef,
    ) -> FanOutReport {
        let convergence = self.convergence();

        self.task_group()
            .run_with_policy(names, self.policy().leaf, |name| {
                let gateway = self.gateway.clone();
                let object = reference(namespace, &name);
                async move {
                    debug!(object = %object, "Deleting");
                    convergence
                        .delete_and_confirm(gateway.as_ref(), &object, MissingObject::Fail)
                        .await
                        .map(|_| ())
                }
            })
            .await
    }
}
