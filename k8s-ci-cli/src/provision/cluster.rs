//! kubeadm control-plane bootstrap and reset

use crate::node::Node;
use anyhow::{Context, Result};
use k8s_ci_lib::Cmd;
use std::path::Path;
use tracing::info;

pub const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";
pub const CONTROL_PLANE_TAINT: &str = "node-role.kubernetes.io/control-plane-";

fn kubectl(kubeconfig: &Path) -> Cmd {
    Cmd::new("kubectl")
        .arg("--kubeconfig")
        .arg(kubeconfig.display().to_string())
}

/// Bring up a single-node control plane that also schedules workloads
pub fn setup(node: &Node<'_>) -> Result<()> {
    let host = node.host;
    let settings = node.settings;

    host.run(&Cmd::sudo("systemctl").args(["enable", "--now", "kubelet"]))?;
    host.run(&Cmd::sudo("kubeadm").args(["config", "images", "pull"]))
        .context("Failed to pull control-plane images")?;
    host.run(
        &Cmd::sudo("kubeadm")
            .arg("init")
            .arg(format!("--pod-network-cidr={}", settings.pod_network_cidr)),
    )
    .context("kubeadm init failed")?;

    let kube_dir = settings.user.kube_dir();
    let kubeconfig = settings.user.kubeconfig();
    host.create_dir_all(&kube_dir)?;
    host.copy_file(Path::new(ADMIN_KUBECONFIG), &kubeconfig)?;
    host.run(
        &Cmd::sudo("chown")
            .arg("-R")
            .arg(format!("{}:{}", settings.user.uid, settings.user.gid))
            .arg(kube_dir.display().to_string()),
    )?;
    info!("Wrote {}", kubeconfig.display());

    host.run(
        &kubectl(&kubeconfig)
            .args(["apply", "-f"])
            .arg(settings.flannel_manifest_url.as_str()),
    )
    .context("Failed to install the pod network")?;
    host.run(&kubectl(&kubeconfig).args(["taint", "nodes", "--all", CONTROL_PLANE_TAINT]))
        .context("Failed to remove the control-plane taint")?;
    Ok(())
}

pub fn reset(node: &Node<'_>) -> Result<()> {
    node.host
        .run(&Cmd::sudo("kubeadm").args(["reset", "-f"]))
        .context("kubeadm reset failed")?;
    node.host.remove_dir_all(&node.settings.user.kube_dir())?;
    Ok(())
}
