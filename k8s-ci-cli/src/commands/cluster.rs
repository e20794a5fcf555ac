//! `install` / `uninstall` entry points

use crate::cli::Cli;
use crate::config::{InvokingUser, Settings, load_config};
use crate::node::Node;
use crate::orchestrator;
use anyhow::{Context, Result};
use clap::Subcommand;
use k8s_ci_lib::{
    DryRunHost, Host, HttpFetcher, OsIdentity, ProxySettings, SystemHost, for_family,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Subcommand)]
pub enum ClusterCommands {
    /// Install containerd and Kubernetes, bootstrap the cluster and deploy the nydus snapshotter
    Install,
    /// Remove everything `install` put on the node
    Uninstall,
}

pub async fn handle_cluster_command(cli: &Cli) -> Result<()> {
    // nothing is touched on an unsupported system
    let os = OsIdentity::detect(&cli.os_release)?;
    info!("Detected {} ({} family)", os.name, os.family);

    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => Default::default(),
    };
    let user = InvokingUser::current()?;
    let settings = Settings::resolve(&cli.overrides(), file, ProxySettings::from_env(), user);
    debug!("Resolved settings: {settings:?}");

    let host: Box<dyn Host> = if cli.dry_run {
        Box::new(DryRunHost)
    } else {
        Box::new(SystemHost::new())
    };
    let fetcher = HttpFetcher::new().context("Failed to set up HTTP client")?;
    let distro = for_family(os.family);
    let node = Node {
        os: &os,
        settings: &settings,
        host: host.as_ref(),
        fetcher: &fetcher,
        distro: distro.as_ref(),
    };

    match cli.command {
        ClusterCommands::Install => orchestrator::install(&node).await,
        ClusterCommands::Uninstall => orchestrator::uninstall(&node),
    }
}
