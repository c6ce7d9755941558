pub mod commands;
pub mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use appmigrate_config::{ConfigLoader, MigrateConfig};
use appmigrate_db::{Migrator, Registry};
use clap::Parser;
use tracing::info;

pub use commands::{Cli, Command, run};
pub use logging::init_tracing;

/// Effective configuration and the file it came from, if any.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: MigrateConfig,
    pub source: Option<PathBuf>,
}

/// Resolve the config for `cli`: `--config`, else the default file when it
/// exists, else built-in defaults. Command line overrides are applied last.
pub fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    let source = cli
        .config
        .clone()
        .or_else(ConfigLoader::existing_default_path);

    let mut config = match &source {
        Some(path) => ConfigLoader::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MigrateConfig::default(),
    };
    cli.apply_overrides(&mut config);
    Ok(LoadedConfig { config, source })
}

/// Entry point for a binary that embeds the migration commands: parse argv,
/// load config, install tracing and run against `registry`.
pub fn main_with(registry: Registry) -> Result<()> {
    let cli = Cli::parse();
    let LoadedConfig { config, source } = load_config(&cli)?;

    init_tracing(&config.log);
    match &source {
        Some(path) => info!("loaded config from {}", path.display()),
        None => info!("no config file found, using defaults"),
    }

    let migrator = Migrator::from_config(&config).context("failed to open database")?;
    let output = run(&cli, &migrator, &registry)?;
    print!("{output}");
    Ok(())
}
