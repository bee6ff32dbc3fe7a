//! Configuration loading.
//!
//! Sources are layered in order, later ones override earlier ones:
//! 1. Config file (`--config FILE`, or `./grove.yaml` if present)
//! 2. Environment variables with the `GROVE_` prefix, nested keys joined by
//!    `__` (e.g. `GROVE_SOURCE__TOKEN` -> `source.token`)
//! 3. Command-line flags
//!
//! Example config file:
//! ```yaml
//! source:
//!   url: https://gitlab.old.example.com
//!   token: glpat-...
//! target:
//!   url: https://gitlab.new.example.com
//!   token: glpat-...
//! target_root: acme
//! exclude_groups: [alice, bob]
//! retry:
//!   max_retries: 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use grove_migrate::MigrationConfig;

pub const DEFAULT_CONFIG_FILE: &str = "grove.yaml";
const ENV_PREFIX: &str = "GROVE";

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub groups_only: bool,
    pub target_root: Option<String>,
    pub source_root: Option<String>,
    pub archive_dir: Option<PathBuf>,
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("exclude_groups")
}

/// Load and validate the migration configuration.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<MigrationConfig> {
    load_with(path, environment(), overrides)
}

fn load_with(
    path: Option<&Path>,
    env: Environment,
    overrides: &Overrides,
) -> Result<MigrationConfig> {
    let mut builder = Config::builder();

    builder = match path {
        Some(path) => {
            tracing::debug!("Loading config from {}", path.display());
            builder.add_source(File::from(path).format(FileFormat::Yaml).required(true))
        }
        None => builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false)),
    };
    builder = builder.add_source(env);
    builder = apply_overrides(builder, overrides)?;

    let config: MigrationConfig = builder
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("failed to parse configuration")?;

    config.validated().context("configuration rejected")
}

fn apply_overrides(
    builder: ConfigBuilder<config::builder::DefaultState>,
    overrides: &Overrides,
) -> Result<ConfigBuilder<config::builder::DefaultState>> {
    let mut builder = builder
        .set_override_option("target_root", overrides.target_root.clone())?
        .set_override_option("source_root", overrides.source_root.clone())?
        .set_override_option(
            "archive_dir",
            overrides
                .archive_dir
                .as_ref()
                .map(|dir| dir.display().to_string()),
        )?;

    if overrides.groups_only {
        builder = builder.set_override("groups_only", true)?;
    }

    Ok(builder)
}
