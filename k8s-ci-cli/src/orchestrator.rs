//! Top-level install and uninstall sequences
//!
//! Install stops at the first failing step and leaves the node as it is.
//! Uninstall tolerates services that are already gone, but every removal
//! step after that is fail-fast as well.

use crate::node::Node;
use crate::provision::{NydusDeployer, cluster, containerd, kubernetes};
use anyhow::{Context, Result};
use k8s_ci_lib::Cmd;
use tracing::warn;

/// Stopped and disabled before anything is removed, in this order
pub const SERVICES: [&str; 3] = ["nydus-snapshotter", "kubelet", "containerd"];

pub async fn install(node: &Node<'_>) -> Result<()> {
    println!("📦 Installing containerd ({})...", node.settings.containerd_source);
    containerd::install(node)
        .await
        .context("Failed to install containerd")?;

    println!("📦 Installing Kubernetes packages...");
    kubernetes::install(node)
        .await
        .context("Failed to install Kubernetes")?;

    println!("🚀 Bootstrapping the control plane...");
    cluster::setup(node).context("Failed to set up the cluster")?;

    println!("🔧 Deploying the nydus snapshotter...");
    NydusDeployer::new(node.host, &node.settings.nydus)
        .deploy()
        .context("Failed to deploy the nydus snapshotter")?;

    println!();
    println!("✅ Kubernetes is ready on this node");
    Ok(())
}

pub fn uninstall(node: &Node<'_>) -> Result<()> {
    println!("🛑 Stopping services...");
    stop_services(node);

    println!("🧹 Removing the nydus snapshotter...");
    NydusDeployer::new(node.host, &node.settings.nydus)
        .undeploy()
        .context("Failed to remove the nydus snapshotter")?;

    println!("🧹 Resetting the cluster...");
    cluster::reset(node).context("Failed to reset the cluster")?;

    println!("🧹 Removing Kubernetes packages...");
    kubernetes::uninstall(node).context("Failed to uninstall Kubernetes")?;

    println!("🧹 Removing containerd...");
    containerd::uninstall(node).context("Failed to uninstall containerd")?;

    println!();
    println!("✅ Uninstall complete. Please reboot the node to clear leftover network state");
    Ok(())
}

fn stop_services(node: &Node<'_>) {
    for service in SERVICES {
        for action in ["stop", "disable"] {
            if let Err(err) = node
                .host
                .run(&Cmd::sudo("systemctl").arg(action).arg(service))
            {
                warn!("systemctl {action} {service} failed: {err}");
            }
        }
    }
}
