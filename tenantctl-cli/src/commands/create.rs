//! `tenantctl create ...`

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use tenantctl_core::kubernetes::types::{PodRequest, Readiness};

use super::{spinner, QuotaArgs, Session};
use crate::output;

#[derive(Subcommand)]
pub enum CreateCommands {
    /// Create a tenant and wait until its credentials are issued
    Tenant { name: String },
    /// Grant a target to the tenant and instantiate it
    TenantTarget {
        target: String,
        #[command(flatten)]
        quota: QuotaArgs,
    },
    /// Run a single-container pod in a tenant-target
    Pod {
        name: String,
        /// Container image
        #[arg(long)]
        image: String,
        /// Container port to expose (repeatable)
        #[arg(long = "port")]
        ports: Vec<i32>,
        /// Secret to expose as an environment variable (repeatable)
        #[arg(long = "secret")]
        secrets: Vec<String>,
        /// Deploy secret used to pull the image
        #[arg(long)]
        deploy_secret: Option<String>,
        #[arg(long)]
        cpu: Option<String>,
        #[arg(long)]
        memory: Option<String>,
        #[arg(long)]
        storage: Option<String>,
        /// Restart the container whenever it exits
        #[arg(long)]
        keep_alive: bool,
        /// Command to run, after `--`
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Store an opaque secret in a tenant-target
    Secret { name: String, data: String },
    /// Store registry credentials from a docker config JSON file
    DeploySecret {
        name: String,
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Define a target group made of the given nodes
    TargetGroup {
        group: String,
        #[arg(required = true)]
        nodes: Vec<String>,
    },
}

pub async fn handle_create_command(command: CreateCommands, session: &Session) -> Result<()> {
    let services = &session.services;

    match command {
        CreateCommands::Tenant { name } => {
            let progress = spinner(format!("Creating tenant '{}'...", name));
            let readiness = services.lifecycle.create_tenant(&name).await;
            progress.finish_and_clear();

            match readiness? {
                Readiness::Ready => output::print_created("Tenant", &name),
                Readiness::NotReady { attempts } => {
                    output::print_created("Tenant", &name);
                    output::print_warning(&format!(
                        "Credentials were not issued after {} checks; they may appear later",
                        attempts
                    ));
                }
            }
        }

        CreateCommands::TenantTarget { target, quota } => {
            let tenant = session.tenant()?;
            let quota = quota.over(services.lifecycle.default_quota());

            services.grants.grant_target(&tenant, &target).await?;
            let info = services
                .lifecycle
                .create_tenant_target(&tenant, &target, Some(&quota))
                .await?;
            output::print_created("Tenant-target", &info.namespace);
        }

        CreateCommands::Pod {
            name,
            image,
            ports,
            secrets,
            deploy_secret,
            cpu,
            memory,
            storage,
            keep_alive,
            command,
        } => {
            let ctx = session.context().await?;
            let request = PodRequest {
                command,
                ports,
                secrets,
                deploy_secret,
                cpu,
                memory,
                storage,
                keep_alive,
                ..PodRequest::new(name, image)
            };

            let pod = services.lifecycle.create_pod(&ctx, &request).await?;
            output::print_created("Pod", &format!("{}/{}", pod.namespace, pod.name));
        }

        CreateCommands::Secret { name, data } => {
            let ctx = session.context().await?;
            let secret = services.lifecycle.create_secret(&ctx, &name, &data).await?;
            output::print_created("Secret", &format!("{}/{}", secret.namespace, secret.name));
        }

        CreateCommands::DeploySecret { name, input } => {
            let ctx = session.context().await?;
            let docker_config = std::fs::read(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let secret = services
                .lifecycle
                .create_deploy_secret(&ctx, &name, docker_config)
                .await?;
            output::print_created(
                "Deploy secret",
                &format!("{}/{}", secret.namespace, secret.name),
            );
        }

        CreateCommands::TargetGroup { group, nodes } => {
            let members = services.lifecycle.set_target_group(&group, &nodes).await?;
            output::print_created("Target group", &group);
            output::print_info(&format!("Members: {}", members.join(", ")));
        }
    }

    Ok(())
}
