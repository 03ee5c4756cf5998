//! tenantctl
//!
//! Command-line interface for multi-tenant provisioning on a Kubernetes cluster

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tenantctl_core::{TenancyServices, TenantctlConfig};

use commands::create::CreateCommands;
use commands::delete::DeleteCommands;
use commands::get::GetCommands;
use commands::list::ListCommands;
use commands::update::UpdateCommands;
use commands::Session;
use output::OutputFormat;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Kubeconfig file
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context
    #[arg(long, global = true)]
    context: Option<String>,

    /// Tenant to act as; derived from the current namespace when omitted
    #[arg(short, long, global = true, env = "TENANTCTL_TENANT")]
    tenant: Option<String>,

    /// Target to act on; the tenant's default target when omitted
    #[arg(long, global = true, env = "TENANTCTL_TARGET")]
    target: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Do not ask for confirmation
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tenants, tenant-targets, workloads and target groups
    Create {
        #[command(subcommand)]
        command: CreateCommands,
    },
    /// Show a single object
    Get {
        #[command(subcommand)]
        command: GetCommands,
    },
    /// List objects
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Change grants, defaults and tenant-targets
    Update {
        #[command(subcommand)]
        command: UpdateCommands,
    },
    /// Delete objects and wait for the cluster to remove them
    Delete {
        #[command(subcommand)]
        command: DeleteCommands,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print a sample configuration file
    Sample,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return Ok(());
    }

    // Load config, flags win over file and environment
    let mut config = TenantctlConfig::load().context("Failed to load configuration")?;
    if cli.kubeconfig.is_some() {
        config.cluster.kubeconfig = cli.kubeconfig.clone();
    }
    if cli.context.is_some() {
        config.cluster.context = cli.context.clone();
    }

    let log_guard = config
        .logging
        .clone()
        .with_verbosity(cli.verbose)
        .init()
        .context("Failed to initialize logging")?;

    let command = match cli.command {
        Commands::Config { command } => {
            match command {
                ConfigCommands::Show => match cli.output {
                    OutputFormat::Yaml => output::print_yaml(&config)?,
                    _ => output::print_json(&config)?,
                },
                ConfigCommands::Sample => print!("{}", TenantctlConfig::generate_sample()),
            }
            return Ok(());
        }
        Commands::Completions { .. } => return Ok(()),
        command => command,
    };

    let services = TenancyServices::connect(&config)
        .await
        .context("Failed to connect to the cluster")?;
    let session = Session {
        services,
        format: cli.output,
        tenant: cli.tenant,
        target: cli.target,
        assume_yes: cli.yes,
    };
    tracing::debug!(tenant = ?session.tenant, target = ?session.target, "Session ready");

    // Execute command
    let result = match command {
        Commands::Create { command } => {
            commands::create::handle_create_command(command, &session).await
        }
        Commands::Get { command } => commands::get::handle_get_command(command, &session).await,
        Commands::List { command } => commands::list::handle_list_command(command, &session).await,
        Commands::Update { command } => {
            commands::update::handle_update_command(command, &session).await
        }
        Commands::Delete { command } => {
            commands::delete::handle_delete_command(command, &session).await
        }
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

/// Generate shell completions
fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tenantctl", "delete", "pod", "p1", "p2", "--tenant", "acme", "--target", "n1", "-y",
        ])
        .unwrap();

        assert_eq!(cli.tenant.as_deref(), Some("acme"));
        assert_eq!(cli.target.as_deref(), Some("n1"));
        assert!(cli.yes);
        match cli.command {
            Commands::Delete {
                command: DeleteCommands::Pod { names },
            } => assert_eq!(names, vec!["p1", "p2"]),
            _ => panic!("expected delete pod"),
        }
    }

    #[test]
    fn test_pod_command_after_separator() {
        let cli = Cli::try_parse_from([
            "tenantctl", "create", "pod", "web", "--image", "nginx", "--port", "80", "--", "nginx",
            "-g", "daemon off;",
        ])
        .unwrap();

        match cli.command {
            Commands::Create {
                command: CreateCommands::Pod { ports, command, .. },
            } => {
                assert_eq!(ports, vec![80]);
                assert_eq!(command, vec!["nginx", "-g", "daemon off;"]);
            }
            _ => panic!("expected create pod"),
        }
    }

    #[test]
    fn test_output_format_values() {
        let cli = Cli::try_parse_from(["tenantctl", "-o", "yaml", "list", "tenants"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Yaml);
        assert!(Cli::try_parse_from(["tenantctl", "-o", "xml", "list", "tenants"]).is_err());
    }
}
