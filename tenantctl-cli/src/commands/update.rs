//! `tenantctl update ...`

use anyhow::Result;
use clap::Subcommand;
use tenantctl_core::lifecycle::PolicyChange;

use super::{QuotaArgs, Session};
use crate::output;

#[derive(Subcommand)]
pub enum UpdateCommands {
    /// Change the tenant's default target
    TenantDefault { target: String },
    /// Re-apply scheduling, policy and role, and change quota amounts
    TenantTarget {
        target: String,
        #[command(flatten)]
        quota: QuotaArgs,
    },
    /// Grant a target to the tenant
    Grant { target: String },
    /// Revoke a target from the tenant
    Revoke { target: String },
}

pub async fn handle_update_command(command: UpdateCommands, session: &Session) -> Result<()> {
    let services = &session.services;
    let tenant = session.tenant()?;

    match command {
        UpdateCommands::TenantDefault { target } => {
            services.resolver.update_default(&tenant, &target).await?;
            output::print_success(&format!("Default target of '{}' is now '{}'", tenant, target));
        }

        UpdateCommands::TenantTarget { target, quota } => {
            let change = services
                .lifecycle
                .update_tenant_target(&tenant, &target, &quota.update())
                .await?;

            if let PolicyChange::Skipped { found } = change {
                output::print_warning(&format!(
                    "{} network policies found, none was updated",
                    found
                ));
            }
            output::print_success(&format!("Tenant-target '{}-{}' updated", tenant, target));
        }

        UpdateCommands::Grant { target } => {
            let grant = services.grants.grant_target(&tenant, &target).await?;
            output::print_success(&format!(
                "Granted {} '{}' to '{}'",
                grant.access_type, grant.target, grant.tenant
            ));
        }

        UpdateCommands::Revoke { target } => {
            services.grants.revoke_target(&tenant, &target).await?;
            output::print_success(&format!("Revoked '{}' from '{}'", target, tenant));
        }
    }

    Ok(())
}
