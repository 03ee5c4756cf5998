//! Command handlers, one module per verb

pub mod create;
pub mod delete;
pub mod get;
pub mod list;
pub mod update;

use anyhow::{bail, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tenantctl_common::{QuotaSpec, QuotaUpdate};
use tenantctl_core::{TenancyServices, TenantContext};

use crate::output::OutputFormat;

/// Connected services plus the global flags every command can use
pub struct Session {
    pub services: TenancyServices,
    pub format: OutputFormat,
    pub tenant: Option<String>,
    pub target: Option<String>,
    pub assume_yes: bool,
}

impl Session {
    /// Tenant from `--tenant`, or derived from the caller's namespace
    pub fn tenant(&self) -> Result<String> {
        Ok(self.services.resolver.resolve_tenant(self.tenant.as_deref())?)
    }

    /// Tenant and target from the flags, falling back to the default target
    pub async fn context(&self) -> Result<TenantContext> {
        Ok(self
            .services
            .resolver
            .resolve(self.tenant.as_deref(), self.target.as_deref())
            .await?)
    }

    /// Ask before a destructive action unless `--yes` was given
    pub fn confirm(&self, prompt: String) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

/// Spinner on stderr for operations that wait on the cluster
pub fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Quota amounts given on the command line
#[derive(Args, Debug, Clone, Default)]
pub struct QuotaArgs {
    /// CPU limit and request (e.g. 500m, 2)
    #[arg(long)]
    pub cpu: Option<String>,
    /// Memory limit and request (e.g. 512Mi, 4Gi)
    #[arg(long)]
    pub memory: Option<String>,
    /// Ephemeral storage limit and request (e.g. 10Gi)
    #[arg(long)]
    pub storage: Option<String>,
}

impl QuotaArgs {
    /// Full quota, taking unset amounts from `defaults`
    pub fn over(&self, defaults: &QuotaSpec) -> QuotaSpec {
        QuotaSpec {
            cpu: self.cpu.clone().unwrap_or_else(|| defaults.cpu.clone()),
            memory: self.memory.clone().unwrap_or_else(|| defaults.memory.clone()),
            storage: self.storage.clone().unwrap_or_else(|| defaults.storage.clone()),
        }
    }

    pub fn update(&self) -> QuotaUpdate {
        QuotaUpdate {
            cpu: self.cpu.clone(),
            memory: self.memory.clone(),
            storage: self.storage.clone(),
        }
    }
}

/// Refuse an empty name list
pub fn require_names(names: &[String], what: &str) -> Result<()> {
    if names.is_empty() {
        bail!("at least one {} name is required", what);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_args_fill_from_defaults() {
        let args = QuotaArgs {
            cpu: Some("500m".to_string()),
            ..Default::default()
        };
        let quota = args.over(&QuotaSpec::default());
        assert_eq!(quota.cpu, "500m");
        assert_eq!(quota.memory, QuotaSpec::default().memory);

        let update = args.update();
        assert_eq!(update.cpu.as_deref(), Some("500m"));
        assert!(update.memory.is_none());
    }
}
