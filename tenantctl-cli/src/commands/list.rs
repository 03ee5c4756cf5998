//! `tenantctl list ...`

use anyhow::Result;
use clap::Subcommand;
use tabled::Tabled;
use tenantctl_common::{Target, TargetScope};
use tenantctl_core::kubernetes::types::{PodInfo, SecretInfo, TenantInfo, TenantTargetInfo};

use super::Session;
use crate::output::{self, or_dash, truncate};

#[derive(Subcommand)]
pub enum ListCommands {
    /// List tenants
    Tenants,
    /// List the targets granted to the tenant
    Targets {
        /// Every target in the cluster instead
        #[arg(long)]
        all: bool,
    },
    /// List the tenant's tenant-targets
    TenantTargets,
    /// List pods of the selected target, or of every granted target
    Pods,
    /// List secrets of the selected target, or of every granted target
    Secrets,
}

#[derive(Tabled)]
struct TenantRow {
    name: String,
    default_target: String,
    grants: String,
    credentials: String,
}

impl From<&TenantInfo> for TenantRow {
    fn from(tenant: &TenantInfo) -> Self {
        Self {
            name: tenant.name.clone(),
            default_target: or_dash(tenant.default_target.as_deref()),
            grants: tenant
                .grants
                .iter()
                .map(|g| g.target.as_str())
                .collect::<Vec<_>>()
                .join(","),
            credentials: if tenant.credentials_ready { "issued" } else { "pending" }.to_string(),
        }
    }
}

#[derive(Tabled)]
struct TargetRow {
    name: String,
    access_type: String,
    node_selector: String,
}

impl From<&Target> for TargetRow {
    fn from(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            access_type: target.access_type.to_string(),
            node_selector: target.node_selector(),
        }
    }
}

#[derive(Tabled)]
struct TenantTargetRow {
    target: String,
    namespace: String,
    phase: String,
    cpu: String,
    memory: String,
    storage: String,
}

impl From<&TenantTargetInfo> for TenantTargetRow {
    fn from(info: &TenantTargetInfo) -> Self {
        let (cpu, memory, storage) = match &info.quota {
            Some(quota) => (
                or_dash(quota.cpu.limit.as_deref()),
                or_dash(quota.memory.limit.as_deref()),
                or_dash(quota.storage.limit.as_deref()),
            ),
            None => {
                let missing = "missing".to_string();
                (missing.clone(), missing.clone(), missing)
            }
        };
        Self {
            target: info.target.clone(),
            namespace: info.namespace.clone(),
            phase: or_dash(info.phase.as_deref()),
            cpu,
            memory,
            storage,
        }
    }
}

#[derive(Tabled)]
struct PodRow {
    name: String,
    namespace: String,
    phase: String,
    image: String,
    node: String,
    restarts: i32,
}

impl From<&PodInfo> for PodRow {
    fn from(pod: &PodInfo) -> Self {
        Self {
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            phase: pod.phase.to_string(),
            image: truncate(pod.image.as_deref().unwrap_or("-"), 40),
            node: or_dash(pod.node_name.as_deref()),
            restarts: pod.restart_count,
        }
    }
}

#[derive(Tabled)]
struct SecretRow {
    name: String,
    namespace: String,
    #[tabled(rename = "type")]
    secret_type: String,
    keys: String,
}

impl From<&SecretInfo> for SecretRow {
    fn from(secret: &SecretInfo) -> Self {
        Self {
            name: secret.name.clone(),
            namespace: secret.namespace.clone(),
            secret_type: secret.secret_type.clone(),
            keys: secret.data_keys.join(","),
        }
    }
}

pub async fn handle_list_command(command: ListCommands, session: &Session) -> Result<()> {
    let services = &session.services;
    let format = session.format;

    match command {
        ListCommands::Tenants => {
            let tenants = services.lifecycle.list_tenants().await?;
            output::print_list(tenants, format, |item| TenantRow::from(item))?;
        }

        ListCommands::Targets { all } => {
            let scope = if all {
                TargetScope::All
            } else {
                TargetScope::Tenant(session.tenant()?)
            };
            let targets = services.catalog.list_targets(&scope).await?;
            output::print_list(targets, format, |item| TargetRow::from(item))?;
        }

        ListCommands::TenantTargets => {
            let tenant = session.tenant()?;
            let targets = services.lifecycle.list_tenant_targets(&tenant).await?;
            output::print_list(targets, format, |item| TenantTargetRow::from(item))?;
        }

        ListCommands::Pods => {
            let tenant = session.tenant()?;
            let pods = services
                .lifecycle
                .list_pods(&tenant, session.target.as_deref())
                .await?;
            output::print_list(pods, format, |item| PodRow::from(item))?;
        }

        ListCommands::Secrets => {
            let tenant = session.tenant()?;
            let secrets = services
                .lifecycle
                .list_secrets(&tenant, session.target.as_deref())
                .await?;
            output::print_list(secrets, format, |item| SecretRow::from(item))?;
        }
    }

    Ok(())
}
