//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::backup::BackupRef;
use crate::errors::{CredVaultError, Result};
use crate::vault::CredentialSummary;

/// How `list` renders credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Simple,
}

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print credential metadata in the requested format. Never prints values.
pub fn print_credentials(credentials: &[CredentialSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(credentials)
                .map_err(|e| CredVaultError::SerializationError(format!("list output: {e}")))?;
            println!("{json}");
        }
        OutputFormat::Simple => {
            for c in credentials {
                println!("{}", c.service);
            }
        }
        OutputFormat::Table => print_credentials_table(credentials),
    }
    Ok(())
}

fn print_credentials_table(credentials: &[CredentialSummary]) {
    if credentials.is_empty() {
        info("No credentials in this vault yet.");
        tip("Run `credvault add <SERVICE>` to add your first credential.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Service", "Fields", "Updated", "Uses", "Last used"]);

    for c in credentials {
        table.add_row(vec![
            c.service.clone(),
            c.field_names.join(", "),
            c.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            c.total_uses.to_string(),
            c.last_used
                .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{table}");
}

/// Print a table of backups, newest first.
pub fn print_backups_table(backups: &[BackupRef]) {
    if backups.is_empty() {
        info("No backups found.");
        tip("Run `credvault backup` to create one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "File", "Kind", "Modified", "Size"]);

    for (i, b) in backups.iter().enumerate() {
        let kind = if b.rolling {
            format!("{} (rolling)", b.kind)
        } else {
            b.kind.to_string()
        };
        table.add_row(vec![
            (i + 1).to_string(),
            b.file_name(),
            kind,
            b.modified.format("%Y-%m-%d %H:%M:%S").to_string(),
            format!("{} B", b.size),
        ]);
    }

    println!("{table}");
}

/// Print the recovery phrase as a numbered grid, four words per row.
pub fn print_mnemonic(words: &[String]) {
    println!();
    println!(
        "{}",
        style("Recovery phrase (write it down, it will not be shown again):")
            .yellow()
            .bold()
    );
    for (row, chunk) in words.chunks(4).enumerate() {
        let line: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(col, w)| format!("{:>2}. {:<10}", row * 4 + col + 1, w))
            .collect();
        println!("  {}", line.join("  "));
    }
    println!();
}
