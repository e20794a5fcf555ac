//! Command-line surface

use crate::commands::ClusterCommands;
use crate::config::{ContainerdSource, Overrides};
use clap::Parser;
use k8s_ci_lib::os::OS_RELEASE_PATH;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "k8s-ci",
    version,
    about = "Single-node Kubernetes for Kata Containers CI",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: ClusterCommands,

    /// TOML file with setting overrides
    #[arg(long, global = true, env = "K8S_CI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where containerd comes from
    #[arg(long, global = true, value_enum, env = "K8S_CI_CONTAINERD_SOURCE")]
    pub containerd_source: Option<ContainerdSource>,

    /// Exact containerd release tag (e.g. v1.7.22), or "latest"
    #[arg(long, global = true, env = "CONTAINERD_VERSION")]
    pub containerd_version: Option<String>,

    /// Print what would be done without touching the system
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, hide = true, default_value = OS_RELEASE_PATH)]
    pub os_release: PathBuf,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            containerd_source: self.containerd_source,
            containerd_version: self
                .containerd_version
                .clone()
                .filter(|version| !version.is_empty()),
        }
    }
}
