//! `tenantctl get ...`

use anyhow::Result;
use clap::Subcommand;
use tenantctl_core::kubernetes::types::{ResourceUsage, SecretInfo};

use super::Session;
use crate::output::{self, or_dash};

#[derive(Subcommand)]
pub enum GetCommands {
    /// Show the tenant, its grants and default target
    Tenant,
    /// Show status and quota usage of a tenant-target
    TenantTarget {
        /// Target name; the default target when omitted
        target: Option<String>,
    },
    /// Show a pod
    Pod { name: String },
    /// Show a secret (values are not printed)
    Secret { name: String },
    /// Show a deploy secret
    DeploySecret { name: String },
    /// Print the logs of a pod
    Logs {
        pod: String,
        /// Only the last N lines
        #[arg(long)]
        tail: Option<i64>,
    },
}

fn usage(resource: &ResourceUsage) -> String {
    format!(
        "{} used of {}",
        or_dash(resource.used_limit.as_deref()),
        or_dash(resource.limit.as_deref())
    )
}

fn secret_fields(secret: &SecretInfo) -> Vec<(&'static str, String)> {
    vec![
        ("Namespace", secret.namespace.clone()),
        ("Type", secret.secret_type.clone()),
        ("Keys", secret.data_keys.join(", ")),
        ("Created", or_dash(secret.created_at.as_deref())),
    ]
}

pub async fn handle_get_command(command: GetCommands, session: &Session) -> Result<()> {
    let services = &session.services;
    let format = session.format;

    match command {
        GetCommands::Tenant => {
            let tenant = services.lifecycle.get_tenant(&session.tenant()?).await?;
            let grants: Vec<String> = tenant
                .grants
                .iter()
                .map(|g| format!("{} ({})", g.target, g.access_type))
                .collect();

            output::print_single(
                &tenant,
                format,
                &format!("Tenant {}", tenant.name),
                &[
                    ("Default target", or_dash(tenant.default_target.as_deref())),
                    ("Grants", grants.join(", ")),
                    ("Credentials", if tenant.credentials_ready { "issued" } else { "pending" }.to_string()),
                ],
            )?;
        }

        GetCommands::TenantTarget { target } => {
            let tenant = session.tenant()?;
            let target = services
                .resolver
                .resolve_target(&tenant, target.as_deref().or(session.target.as_deref()))
                .await?;
            let info = services.lifecycle.get_tenant_target(&tenant, &target).await?;

            let mut fields = vec![
                ("Namespace", info.namespace.clone()),
                ("Phase", or_dash(info.phase.as_deref())),
                ("Node selector", or_dash(info.node_selector.as_deref())),
                ("Pods", info.pod_count.map_or("-".to_string(), |n| n.to_string())),
            ];
            match &info.quota {
                Some(quota) => {
                    fields.push(("CPU", usage(&quota.cpu)));
                    fields.push(("Memory", usage(&quota.memory)));
                    fields.push(("Storage", usage(&quota.storage)));
                }
                None => fields.push(("Quota", "missing".to_string())),
            }

            output::print_single(
                &info,
                format,
                &format!("Tenant-target {}/{}", info.tenant, info.target),
                &fields,
            )?;
        }

        GetCommands::Pod { name } => {
            let ctx = session.context().await?;
            let pod = services.lifecycle.get_pod(&ctx, &name).await?;

            output::print_single(
                &pod,
                format,
                &format!("Pod {}", pod.name),
                &[
                    ("Namespace", pod.namespace.clone()),
                    ("Phase", pod.phase.to_string()),
                    ("Image", or_dash(pod.image.as_deref())),
                    ("Node", or_dash(pod.node_name.as_deref())),
                    ("IP", or_dash(pod.pod_ip.as_deref())),
                    ("Restarts", pod.restart_count.to_string()),
                    ("Secrets", pod.secrets.join(", ")),
                    ("Created", or_dash(pod.created_at.as_deref())),
                ],
            )?;
        }

        GetCommands::Secret { name } => {
            let ctx = session.context().await?;
            let secret = services.lifecycle.get_secret(&ctx, &name).await?;
            output::print_single(
                &secret,
                format,
                &format!("Secret {}", secret.name),
                &secret_fields(&secret),
            )?;
        }

        GetCommands::DeploySecret { name } => {
            let ctx = session.context().await?;
            let secret = services.lifecycle.get_deploy_secret(&ctx, &name).await?;
            output::print_single(
                &secret,
                format,
                &format!("Deploy secret {}", secret.name),
                &secret_fields(&secret),
            )?;
        }

        GetCommands::Logs { pod, tail } => {
            let ctx = session.context().await?;
            let logs = services.lifecycle.pod_logs(&ctx, &pod, tail).await?;
            println!("{}", logs);
        }
    }

    Ok(())
}
