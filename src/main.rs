use clap::Parser;
use credvault::cli::{AuthAction, Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credvault=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            no_recovery,
            passphrase,
        } => credvault::cli::commands::init::execute(&cli, no_recovery, passphrase),
        Commands::Add {
            ref service,
            ref username,
            ref notes,
        } => credvault::cli::commands::add::execute(
            &cli,
            service,
            username.as_deref(),
            notes.as_deref(),
        ),
        Commands::Set {
            ref service,
            ref field,
            ref value,
        } => credvault::cli::commands::set::execute(&cli, service, field, value.as_deref()),
        Commands::Get {
            ref service,
            ref field,
            copy,
        } => credvault::cli::commands::get::execute(&cli, service, field, copy),
        Commands::List { format } => credvault::cli::commands::list::execute(&cli, format),
        Commands::Delete { ref service, force } => {
            credvault::cli::commands::delete::execute(&cli, service, force)
        }
        Commands::ChangePassword => credvault::cli::commands::change_password::execute(&cli),
        Commands::Recover => credvault::cli::commands::recover::execute(&cli),
        Commands::Backup => credvault::cli::commands::backup::execute_create(&cli),
        Commands::Backups => credvault::cli::commands::backup::execute_list(&cli),
        Commands::Restore { force, dry_run } => {
            credvault::cli::commands::restore::execute(&cli, force, dry_run)
        }
        Commands::Audit { last, ref since } => {
            credvault::cli::commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
        Commands::Auth { ref action } => match action {
            AuthAction::Keyring { delete } => {
                credvault::cli::commands::auth::execute_keyring(&cli, *delete)
            }
        },
        Commands::Completions { ref shell } => credvault::cli::commands::completions::execute(shell),
    };

    if let Err(e) = result {
        credvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
