//! Output formatting for CLI
//!
//! Every command prints through these helpers so tables, JSON and YAML look
//! the same everywhere. Status lines go to stdout, errors to stderr.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use tenantctl_core::lifecycle::FanOutReport;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// Print `items` as a table of rows, or serialize them as they are
pub fn print_list<T, R, F>(items: Vec<T>, format: OutputFormat, to_row: F) -> anyhow::Result<()>
where
    T: Serialize,
    R: Tabled,
    F: Fn(&T) -> R,
{
    match format {
        OutputFormat::Table => print_table(items.iter().map(to_row).collect()),
        OutputFormat::Json => print_json(&items)?,
        OutputFormat::Yaml => print_yaml(&items)?,
    }
    Ok(())
}

/// Print a single item as `key: value` lines, or serialize it
pub fn print_single<T: Serialize>(
    data: &T,
    format: OutputFormat,
    title: &str,
    fields: &[(&str, String)],
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", title.bold());
            let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in fields {
                println!("  {:width$}  {}", format!("{}:", key), value, width = width + 1);
            }
        }
        OutputFormat::Json => print_json(data)?,
        OutputFormat::Yaml => print_yaml(data)?,
    }
    Ok(())
}

/// Print data as a table using the tabled crate
pub fn print_table<T: Tabled>(data: Vec<T>) {
    if data.is_empty() {
        println!("{}", "No results found".yellow());
        return;
    }

    let table = Table::new(data);
    println!("{}", table);
}

/// Print data as pretty-printed JSON
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(data)?;
    println!("{}", yaml);
    Ok(())
}

/// Print a success message with green checkmark
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print a success message for resource creation
pub fn print_created(resource_type: &str, name: &str) {
    println!(
        "{} {} '{}' created",
        "✓".green().bold(),
        resource_type.green(),
        name.green().bold()
    );
}

/// Print an error message with red X
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message with blue i
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message with yellow triangle
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print the failures of a fan-out, one per line, then "Done"
pub fn print_report(resource_type: &str, report: &FanOutReport) {
    for outcome in report.outcomes() {
        match &outcome.error {
            Some(error) => print_error(&format!("{} '{}': {}", resource_type, outcome.name, error)),
            None => println!(
                "{} {} '{}' deleted",
                "✓".green().bold(),
                resource_type.green(),
                outcome.name.green().bold()
            ),
        }
    }
    println!("Done");
}

/// Render an optional value, `-` when absent
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

/// Truncate a string to max length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        format!("{}...", s.chars().take(max_len - 3).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("registry.example.com/app:1", 10), "registr...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(None), "-");
        assert_eq!(or_dash(Some("n1")), "n1");
    }
}
