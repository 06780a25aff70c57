//! # Command Line Interface
//!
//! Operator commands for database migrations and bootstrapping the first administrator.

pub mod principal;

use crate::config::DatabaseConfig;
use crate::storage::{
    create_pool, get_migration_version, list_applied_migrations, pending_migrations,
    run_db_migrations, MigrationInfo,
};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "warden-cli")]
#[command(about = "Warden operator tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Database management commands
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },

    /// Principal administration commands
    Principal {
        #[command(subcommand)]
        command: principal::PrincipalCommands,
    },
}

#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// Apply pending migrations
    Migrate {
        /// List pending migrations without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the applied version and any pending migrations
    Status,

    /// List applied migrations
    List,
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose)?;

    let mut database = DatabaseConfig::from_env();
    if let Some(url) = cli.database_url {
        database.url = url;
    }
    // Migrations are always explicit from the CLI
    database.auto_migrate = false;

    match cli.command {
        Commands::Database { command } => handle_database_command(command, &database).await?,
        Commands::Principal { command } => {
            principal::handle_principal_command(command, &database).await?
        }
    }

    Ok(())
}

fn initialise_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_env_filter(filter).finish(),
    )
    .is_err()
    {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
    }
    Ok(())
}

async fn handle_database_command(
    command: DatabaseCommands,
    config: &DatabaseConfig,
) -> anyhow::Result<()> {
    let pool = create_pool(config).await?;

    match command {
        DatabaseCommands::Migrate { dry_run } => {
            let pending = pending_migrations(&pool).await?;
            if pending.is_empty() {
                println!("{}", "Database schema is up to date".green());
            } else if dry_run {
                println!("Pending migrations:");
                for (version, description) in &pending {
                    println!("  {:<15} {}", version, description);
                }
            } else {
                println!("Applying {} migration(s)...", pending.len());
                run_db_migrations(&pool).await?;
                println!("{}", "Migrations completed successfully".green());
            }
        }

        DatabaseCommands::Status => {
            let version = get_migration_version(&pool).await?;
            let pending = pending_migrations(&pool).await?;
            match version {
                Some(version) => println!("Current schema version: {}", version),
                None => println!("No migrations have been applied"),
            }
            if pending.is_empty() {
                println!("{}", "Database schema is up to date".green());
            } else {
                println!("{}", format!("{} pending migration(s)", pending.len()).yellow());
                std::process::exit(1);
            }
        }

        DatabaseCommands::List => {
            let migrations = list_applied_migrations(&pool).await?;
            if migrations.is_empty() {
                println!("No migrations have been applied");
            } else {
                println!("Applied migrations:");
                print_migrations_table(&migrations);
            }
        }
    }

    Ok(())
}

fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!();
    println!("{:<15} {:<50} {:<25} {:<8}", "Version", "Description", "Applied On", "Success");
    println!("{}", "-".repeat(100));

    for migration in migrations {
        println!(
            "{:<15} {:<50} {:<25} {:<8}",
            migration.version,
            truncate_string(&migration.description, 48),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.success
        );
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_create_admin() {
        let cli = Cli::try_parse_from([
            "warden-cli",
            "principal",
            "create-admin",
            "--username",
            "root",
            "--full-name",
            "Root Admin",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Principal { .. }));
    }

    #[test]
    fn truncate_string_keeps_short_values() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a much longer description", 10), "a much ...");
    }
}
