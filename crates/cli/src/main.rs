mod commands;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use commands::*;
use std::path::PathBuf;
use tidy_core::{init_logging, AppConfig, LoggingConfig};

#[derive(Parser)]
#[command(name = "tidy")]
#[command(version, about = "Versioned SQL migrations for the tidy todo service")]
struct Cli {
    /// Database connection URL, overriding the environment
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Directory holding the migration files
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    /// Project configuration file (defaults to ./tidy.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate {
        /// Stop after applying this version
        #[arg(long)]
        to: Option<String>,
    },

    /// Roll back the named migration, or the most recently applied one
    Rollback {
        /// Version to roll back
        version: Option<String>,
    },

    /// Show which migrations are executed and which are pending
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the next-numbered migration and its rollback script
    Create {
        /// Migration name
        name: String,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    if let Some(url) = &cli.database_url {
        config.set_database_url(url.clone());
    }
    if let Some(dir) = &cli.migrations_dir {
        config.set_migrations_dir(dir.clone());
    }
    if let Some(level) = &cli.log_level {
        config.set_log_level(level.clone())?;
    }

    Ok(config)
}

async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&LoggingConfig::from_app_config(&config))
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    tracing::debug!(
        "Running in {} with migrations from {}",
        config.environment,
        config.migrations_dir.display()
    );
    if let Some(source) = config.config_sources().get("database_url") {
        tracing::debug!("Database URL taken from {}", source);
    }

    match cli.command {
        Commands::Migrate { to } => migrate::run(&config, to.as_deref()).await,
        Commands::Rollback { version } => migrate::rollback(&config, version.as_deref()).await,
        Commands::Status { json } => migrate::status(&config, json).await,
        Commands::Create { name } => migrate::create(&config, &name).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = execute(cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
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
    fn test_parse_migrate_to() {
        let cli = Cli::try_parse_from(["tidy", "migrate", "--to", "002"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate { to: Some(ref v) } if v == "002"));

        let cli = Cli::try_parse_from(["tidy", "migrate"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate { to: None }));
    }

    #[test]
    fn test_parse_rollback_and_global_flags() {
        let cli = Cli::try_parse_from([
            "tidy",
            "rollback",
            "001",
            "--database-url",
            "sqlite://tidy.db",
            "--migrations-dir",
            "db/migrations",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Rollback { version: Some(ref v) } if v == "001"));
        assert_eq!(cli.database_url.as_deref(), Some("sqlite://tidy.db"));
        assert_eq!(cli.migrations_dir, Some(PathBuf::from("db/migrations")));
    }

    #[test]
    fn test_parse_status_json() {
        let cli = Cli::try_parse_from(["tidy", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }

    #[test]
    fn test_create_requires_name() {
        assert!(Cli::try_parse_from(["tidy", "create"]).is_err());
        assert!(Cli::try_parse_from(["tidy"]).is_err());
    }
}
