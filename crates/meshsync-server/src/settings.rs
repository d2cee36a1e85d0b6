//! Configuration loading
//!
//! Sources, lowest precedence first:
//! 1. the configuration file (`--config`, optional)
//! 2. `MESHSYNC_*` environment variables, `__` separating nested keys
//!    (`MESHSYNC_ADS__NODE_TYPE`)
//! 3. command line flags
//!
//! When no registry is configured through these, the legacy JSON registry
//! file is read. An unset namespace falls back to `PUBLISH_NAMESPACE`, then
//! `POD_NAMESPACE`, then `default`.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use meshsync_common::config::load_registry_file;
use meshsync_common::constants::{
    DEFAULT_REGISTRY_CONFIG_PATH, POD_NAMESPACE_ENV, PUBLISH_NAMESPACE_ENV,
};
use meshsync_common::SyncerConfig;
use tracing::debug;

use crate::cli::Cli;

pub const ENV_PREFIX: &str = "MESHSYNC";

fn build(cli: &Cli) -> Result<SyncerConfig> {
    let mut builder = Config::builder()
        .add_source(File::from(cli.config_path().as_path()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    if let Some(v) = &cli.mesh_id {
        builder = builder.set_override("mesh_id", v.as_str())?;
    }
    if let Some(v) = &cli.region_id {
        builder = builder.set_override("region_id", v.as_str())?;
    }
    if let Some(v) = &cli.namespace {
        builder = builder.set_override("namespace", v.as_str())?;
    }
    if let Some(path) = &cli.kubeconfig {
        builder = builder.set_override("kubeconfig", path.to_string_lossy().as_ref())?;
    }
    if cli.debug {
        builder = builder.set_override("debug", true)?;
    }
    if cli.dry_run {
        builder = builder.set_override("dry_run", true)?;
    }

    let config = builder
        .build()
        .context("failed to read configuration sources")?
        .try_deserialize()
        .context("failed to parse configuration")?;
    Ok(config)
}

/// Load, complete and validate the process configuration.
pub fn load(cli: &Cli) -> Result<SyncerConfig> {
    let mut config = build(cli)?;

    if config.registries.is_empty() {
        let explicit = cli.registry_config.is_some();
        let path = cli
            .registry_config
            .clone()
            .unwrap_or_else(|| DEFAULT_REGISTRY_CONFIG_PATH.into());
        if explicit || Path::new(&path).exists() {
            config.registries = load_registry_file(&path)
                .with_context(|| format!("failed to load registry file {}", path.display()))?;
            debug!(path = %path.display(), count = config.registries.len(), "Loaded registry file");
        }
    }

    config.namespace = config.resolve_namespace(
        std::env::var(PUBLISH_NAMESPACE_ENV).ok(),
        std::env::var(POD_NAMESPACE_ENV).ok(),
    );
    config.validate().context("invalid configuration")?;
    Ok(config)
}
