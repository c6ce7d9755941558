use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use appmigrate_config::MigrateConfig;
use appmigrate_db::{Application, LedgerRecord, MigrationsStatus, Migrator, Registry};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "appmigrate",
    about = "Apply and roll back application migrations"
)]
pub struct Cli {
    /// Config file (YAML or TOML)
    #[arg(long, global = true, env = "APPMIGRATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file, overrides the config
    #[arg(long, global = true, env = "APPMIGRATE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Log filter, overrides the config (RUST_LOG still wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply all pending migrations of one app, or of every app
    Migrate { app: Option<String> },
    /// Move an app to a migration; `zero` reverts everything
    MigrateTo { app: String, target: String },
    /// Show applied and pending migrations
    Status { app: Option<String> },
    /// Dump the raw ledger rows of an app
    Ledger { app: String },
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut MigrateConfig) {
        if let Some(path) = &self.database {
            config.database.path = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

/// Execute the parsed command and return what should be printed.
pub fn run(cli: &Cli, migrator: &Migrator, registry: &Registry) -> Result<String> {
    match &cli.command {
        Command::Migrate { app } => {
            let changes = match app {
                Some(name) => migrator.migrate(lookup(registry, name)?)?,
                None => migrator.migrate_all(registry)?,
            };
            render_changes(&changes, cli.json, "no migrations to apply")
        }
        Command::MigrateTo { app, target } => {
            let changes = migrator.migrate_to(lookup(registry, app)?, target)?;
            render_changes(&changes, cli.json, "already at target")
        }
        Command::Status { app } => {
            let statuses = match app {
                Some(name) => migrator.show_migrations(lookup(registry, name)?)?,
                None => migrator.show_all(registry)?,
            };
            render_changes(&statuses, cli.json, "no migrations declared")
        }
        Command::Ledger { app } => {
            let records = migrator.ledger_records(app)?;
            render_ledger(&records, cli.json)
        }
    }
}

fn lookup<'a>(registry: &'a Registry, name: &str) -> Result<&'a dyn Application> {
    registry
        .get(name)
        .ok_or_else(|| anyhow!("unknown application: {name}"))
}

fn render_changes(statuses: &MigrationsStatus, json: bool, empty: &str) -> Result<String> {
    if json {
        return Ok(format!("{}\n", statuses.to_json()?));
    }
    if statuses.is_empty() {
        return Ok(format!("{empty}\n"));
    }
    Ok(statuses.render())
}

fn render_ledger(records: &[LedgerRecord], json: bool) -> Result<String> {
    if json {
        let body = serde_json::to_string_pretty(records).context("failed to encode ledger")?;
        return Ok(format!("{body}\n"));
    }
    Ok(records
        .iter()
        .map(|r| format!("{}\t{}\t{}\n", r.id, r.app_name, r.migration_id))
        .collect())
}
