use anyhow::{Context, Result};
use std::fmt::Write as _;
use tidy_core::AppConfig;
use tidy_orm::{MigrationConfig, MigrationRegistry, MigrationRunner, MigrationState, PoolConfig, StatusReport};

fn migration_config(config: &AppConfig) -> MigrationConfig {
    MigrationConfig {
        migrations_dir: config.migrations_dir.clone(),
        migrations_table: config.migrations_table.clone(),
        version_width: config.version_width,
        strict_checksums: config.strict_checksums,
    }
}

async fn connect(config: &AppConfig) -> Result<MigrationRunner> {
    let database_url = config.require_database_url()?;
    let runner = MigrationRunner::connect(migration_config(config), database_url, &PoolConfig::default())
        .await
        .context("could not open the migration database")?;
    Ok(runner)
}

pub async fn create(config: &AppConfig, name: &str) -> Result<()> {
    let registry = MigrationRegistry::with_config(migration_config(config));
    let (forward, rollback) = registry
        .create_migration(name)
        .with_context(|| format!("failed to create migration '{}'", name))?;

    println!("Created migration: {}", forward.display());
    println!("Created rollback:  {}", rollback.display());
    Ok(())
}

pub async fn run(config: &AppConfig, to: Option<&str>) -> Result<()> {
    let runner = connect(config).await?;

    let outcome = match to {
        Some(target) => runner.run_migrations_to(target).await,
        None => runner.run_migrations().await,
    };
    runner.pool().close().await;
    let result = outcome.map_err(|err| {
        let context = if err.is_fatal_setup() {
            "migrate aborted before applying any migration"
        } else {
            "migrate failed"
        };
        anyhow::Error::new(err).context(context)
    })?;

    for drift in &result.drifted {
        eprintln!(
            "warning: migration {} ({}) changed after it was applied",
            drift.version, drift.name
        );
    }

    if result.applied_migrations.is_empty() {
        println!("Nothing to migrate ({} already applied)", result.skipped_count);
        return Ok(());
    }

    for version in &result.applied_migrations {
        println!("  applied {}", version);
    }
    println!(
        "Applied {} migration(s) in {}ms",
        result.applied_count(),
        result.execution_time_ms
    );
    Ok(())
}

pub async fn rollback(config: &AppConfig, version: Option<&str>) -> Result<()> {
    let runner = connect(config).await?;
    let outcome = runner.rollback(version).await;
    runner.pool().close().await;
    let result = outcome.context("rollback failed")?;

    match result.rolled_back {
        Some(entry) => println!(
            "Rolled back {} ({}) in {}ms",
            entry.version, entry.name, result.execution_time_ms
        ),
        None => println!("Nothing to roll back"),
    }
    Ok(())
}

pub async fn status(config: &AppConfig, json: bool) -> Result<()> {
    let runner = connect(config).await?;
    let outcome = runner.status().await;
    runner.pool().close().await;
    let report = outcome.context("status failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_status(&report));
    }
    Ok(())
}

/// Human readable status table, one line per migration in version order
pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str("Migration Status:\n");
    out.push_str("================\n");

    if report.migrations.is_empty() {
        out.push_str("No migrations found\n");
    }

    for migration in &report.migrations {
        match &migration.state {
            MigrationState::Pending => {
                let _ = writeln!(out, "  {:<9} {}  {}", "PENDING", migration.version, migration.name);
            }
            MigrationState::Executed {
                executed_at,
                checksum_matches,
            } => {
                let _ = write!(
                    out,
                    "  {:<9} {}  {}  ({})",
                    "EXECUTED",
                    migration.version,
                    migration.name,
                    executed_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if !checksum_matches {
                    out.push_str("  [file changed since applied]");
                }
                out.push('\n');
            }
        }
    }

    if !report.orphaned.is_empty() {
        out.push_str("\nApplied but missing on disk:\n");
        for entry in &report.orphaned {
            let _ = writeln!(out, "  {}  {}", entry.version, entry.name);
        }
    }

    let _ = writeln!(
        out,
        "\n{} executed, {} pending",
        report.executed_count(),
        report.pending_count()
    );
    out
}
