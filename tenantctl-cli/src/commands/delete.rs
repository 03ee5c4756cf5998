//! `tenantctl delete ...`
//!
//! Deletions wait until the cluster has removed each object. Per-object
//! failures are printed and do not abort the command.

use anyhow::Result;
use clap::Subcommand;

use super::{require_names, spinner, Session};
use crate::output;

#[derive(Subcommand)]
pub enum DeleteCommands {
    /// Delete tenants together with all their tenant-targets
    Tenant { names: Vec<String> },
    /// Delete tenant-targets and revoke their grants
    TenantTarget { targets: Vec<String> },
    /// Delete pods
    Pod { names: Vec<String> },
    /// Delete secrets
    Secret { names: Vec<String> },
    /// Remove a target group from every node
    TargetGroup { group: String },
}

pub async fn handle_delete_command(command: DeleteCommands, session: &Session) -> Result<()> {
    let services = &session.services;

    match command {
        DeleteCommands::Tenant { names } => {
            require_names(&names, "tenant")?;
            if !session.confirm(format!(
                "Delete tenant(s) {} and everything they own?",
                names.join(", ")
            ))? {
                output::print_info("Deletion aborted");
                return Ok(());
            }

            let progress = spinner(format!("Deleting {} tenant(s)...", names.len()));
            let results = services.lifecycle.delete_tenants(&names).await;
            progress.finish_and_clear();

            for deletion in &results {
                for failure in deletion.failures() {
                    output::print_error(&format!("tenant '{}': {}", deletion.tenant, failure));
                }
                if deletion.is_success() {
                    output::print_success(&format!("Tenant '{}' deleted", deletion.tenant));
                }
            }
            println!("Done");
        }

        DeleteCommands::TenantTarget { targets } => {
            require_names(&targets, "target")?;
            let tenant = session.tenant()?;
            if !session.confirm(format!(
                "Delete tenant-target(s) {} of '{}' and their workloads?",
                targets.join(", "),
                tenant
            ))? {
                output::print_info("Deletion aborted");
                return Ok(());
            }

            let progress = spinner(format!("Deleting {} tenant-target(s)...", targets.len()));
            let report = services.lifecycle.delete_tenant_targets(&tenant, &targets).await;
            progress.finish_and_clear();
            output::print_report("Tenant-target", &report);
        }

        DeleteCommands::Pod { names } => {
            require_names(&names, "pod")?;
            let ctx = session.context().await?;
            if !session.confirm(format!("Delete pod(s) {} in {}?", names.join(", "), ctx.namespace))? {
                output::print_info("Deletion aborted");
                return Ok(());
            }

            let progress = spinner(format!("Deleting {} pod(s)...", names.len()));
            let report = services.lifecycle.delete_pods(&ctx, &names).await;
            progress.finish_and_clear();
            output::print_report("Pod", &report?);
        }

        DeleteCommands::Secret { names } => {
            require_names(&names, "secret")?;
            let ctx = session.context().await?;
            if !session.confirm(format!(
                "Delete secret(s) {} in {}?",
                names.join(", "),
                ctx.namespace
            ))? {
                output::print_info("Deletion aborted");
                return Ok(());
            }

            let progress = spinner(format!("Deleting {} secret(s)...", names.len()));
            let report = services.lifecycle.delete_secrets(&ctx, &names).await;
            progress.finish_and_clear();
            output::print_report("Secret", &report?);
        }

        DeleteCommands::TargetGroup { group } => {
            if !session.confirm(format!("Delete target group '{}'?", group))? {
                output::print_info("Deletion aborted");
                return Ok(());
            }

            services.lifecycle.delete_target_group(&group).await?;
            output::print_success(&format!("Target group '{}' deleted", group));
        }
    }

    Ok(())
}
