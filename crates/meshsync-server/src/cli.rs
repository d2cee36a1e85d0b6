//! Command line arguments

use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/meshsync/config.yaml";

/// Command line arguments for the controller
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "meshsync", version, about = "Sync external service registries into mesh ServiceEntries")]
pub struct Cli {
    /// Configuration file; missing files are ignored
    #[arg(short = 'c', long = "config", env = "MESHSYNC_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Legacy JSON registry list
    #[arg(long = "registry-config", env = "MESHSYNC_REGISTRY_CONFIG")]
    pub registry_config: Option<PathBuf>,

    #[arg(long = "mesh-id", env = "MESH_ID")]
    pub mesh_id: Option<String>,

    #[arg(long = "region-id", env = "REGION_ID")]
    pub region_id: Option<String>,

    /// Namespace to publish into when a registry names none
    #[arg(short = 'n', long = "namespace")]
    pub namespace: Option<String>,

    /// Kubeconfig of the mesh cluster; defaults to `KUBECONFIG` or in-cluster
    #[arg(long = "kubeconfig")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long = "debug")]
    pub debug: bool,

    /// Keep ServiceEntries in memory instead of writing them to the cluster
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}
