//! `credvault audit` — display the audit log.
//!
//! Usage:
//!   credvault audit               # show last 50 entries
//!   credvault audit --last 20     # show last 20
//!   credvault audit --since 7d    # entries from last 7 days

use std::path::Path;

use chrono::Utc;

use crate::audit::{AuditEntry, AuditLog};
use crate::cli::output;
use crate::cli::{settings, vault_path, Cli};
use crate::errors::{CredVaultError, Result};

/// Execute the `audit` command.
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let settings = settings()?;
    let path = vault_path(cli, &settings)?;
    let vault_dir = path.parent().unwrap_or(Path::new("."));

    if !AuditLog::db_path(vault_dir).exists() {
        output::info("No audit entries found.");
        return Ok(());
    }
    let audit = AuditLog::open(vault_dir)?;

    let since_dt = match since {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let entries = audit.query(last, since_dt)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

/// Parse a human-friendly duration string like "7d", "24h", "30m".
fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();

    let (num_str, unit) = if let Some(s) = input.strip_suffix('d') {
        (s, 'd')
    } else if let Some(s) = input.strip_suffix('h') {
        (s, 'h')
    } else if let Some(s) = input.strip_suffix('m') {
        (s, 'm')
    } else {
        return Err(CredVaultError::CommandFailed(format!(
            "invalid duration '{input}' — use format like 7d, 24h, or 30m"
        )));
    };

    let num: i64 = num_str.parse().map_err(|_| {
        CredVaultError::CommandFailed(format!(
            "invalid duration '{input}' — number part is not valid"
        ))
    })?;

    let out_of_range = || {
        CredVaultError::CommandFailed(format!("invalid duration '{input}' — value is out of range"))
    };
    let duration = match unit {
        'd' => chrono::TimeDelta::try_days(num),
        'h' => chrono::TimeDelta::try_hours(num),
        _ => chrono::TimeDelta::try_minutes(num),
    }
    .ok_or_else(out_of_range)?;

    Utc::now()
        .checked_sub_signed(duration)
        .ok_or_else(out_of_range)
}

/// Print audit entries in a formatted table.
pub fn print_audit_table(entries: &[AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Event", "Outcome", "Details"]);

    for entry in entries {
        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            colorize_event(&entry.event),
            colorize_outcome(&entry.outcome),
            entry.context.as_deref().unwrap_or("-").to_string(),
        ]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Colorize event names for display.
fn colorize_event(event: &str) -> String {
    use console::style;

    match event {
        "initialize" | "credential-add" => style(event).green().to_string(),
        "credential-update" | "unlock" => style(event).blue().to_string(),
        "credential-delete" => style(event).red().to_string(),
        "change-password" | "recovery-begin" | "recovery-verify" | "recovery-complete" => {
            style(event).yellow().to_string()
        }
        "backup" | "restore" => style(event).cyan().to_string(),
        _ => event.to_string(),
    }
}

fn colorize_outcome(outcome: &str) -> String {
    use console::style;

    match outcome {
        "success" => style(outcome).green().to_string(),
        "failure" => style(outcome).red().bold().to_string(),
        _ => style(outcome).dim().to_string(),
    }
}
