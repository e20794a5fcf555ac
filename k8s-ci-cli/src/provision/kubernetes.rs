//! kubeadm, kubelet and kubectl packages plus the kernel settings they need

use crate::node::Node;
use anyhow::{Context, Result};
use k8s_ci_lib::proxy;
use k8s_ci_lib::version::resolve_kubernetes_channel;
use k8s_ci_lib::{Cmd, Host};
use std::path::Path;

pub const SYSCTL_PATH: &str = "/etc/sysctl.d/k8s.conf";
pub const SYSCTL_SETTINGS: &str = "net.bridge.bridge-nf-call-iptables = 1\n\
                                   net.bridge.bridge-nf-call-ip6tables = 1\n\
                                   net.ipv4.ip_forward = 1\n";
pub const KUBELET_DROPIN_DIR: &str = "/etc/systemd/system/kubelet.service.d";

fn apply_sysctl(host: &dyn Host) -> Result<()> {
    host.run(&Cmd::sudo("sysctl").arg("--system"))
        .context("Failed to apply sysctl settings")
}

pub async fn install(node: &Node<'_>) -> Result<()> {
    let host = node.host;
    host.write_file(Path::new(SYSCTL_PATH), SYSCTL_SETTINGS)?;
    apply_sysctl(host)?;

    let channel = resolve_kubernetes_channel(node.fetcher)
        .await
        .context("Failed to determine the stable Kubernetes release")?;
    node.distro
        .register_kubernetes_repository(host, &channel)
        .context("Failed to register the Kubernetes package repository")?;
    node.distro
        .install_kubernetes_packages(host)
        .context("Failed to install kubeadm, kubelet and kubectl")?;
    node.distro.disable_firewall(host)?;
    if node.settings.selinux_permissive {
        node.distro.set_selinux_permissive(host)?;
    }

    proxy::write_snippet(host, &node.settings.proxy, Path::new(KUBELET_DROPIN_DIR))
        .context("Failed to write kubelet proxy snippet")?;
    host.run(&Cmd::sudo("systemctl").args(["restart", "kubelet"]))?;
    Ok(())
}

pub fn uninstall(node: &Node<'_>) -> Result<()> {
    let host = node.host;
    proxy::remove_snippet(host, Path::new(KUBELET_DROPIN_DIR))?;
    node.distro
        .remove_kubernetes_packages(host)
        .context("Failed to remove kubeadm, kubelet and kubectl")?;
    node.distro.unregister_kubernetes_repository(host)?;
    host.remove_file(Path::new(SYSCTL_PATH))?;
    apply_sysctl(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerdSource;
    use crate::testing::{centos, debian, node_settings};
    use k8s_ci_lib::testing::{CannedFetcher, RecordingHost};
    use k8s_ci_lib::version::KUBERNETES_STABLE_URL;
    use k8s_ci_lib::{ProxySettings, for_family};

    fn fetcher() -> CannedFetcher {
        CannedFetcher::default().with(KUBERNETES_STABLE_URL, "v1.31.2\n")
    }

    #[tokio::test]
    async fn test_debian_install() {
        let host = RecordingHost::default();
        let fetcher = fetcher();
        let os = debian();
        let distro = for_family(os.family);
        let mut settings = node_settings(ContainerdSource::Tarball);
        settings.proxy = ProxySettings {
            http_proxy: Some("http://proxy:3128".into()),
            ..ProxySettings::default()
        };
        let node = Node {
            os: &os,
            settings: &settings,
            host: &host,
            fetcher: &fetcher,
            distro: distro.as_ref(),
        };

        install(&node).await.unwrap();

        assert_eq!(host.file(Path::new(SYSCTL_PATH)).as_deref(), Some(SYSCTL_SETTINGS));
        let commands = host.commands();
        assert_eq!(commands[0], "sysctl --system");
        assert!(commands.contains(&"apt-mark hold kubelet kubeadm kubectl".to_string()));
        assert!(!commands.iter().any(|c| c.contains("firewalld")));
        assert_eq!(commands.last().map(String::as_str), Some("systemctl restart kubelet"));
        assert!(host
            .file(Path::new("/etc/apt/sources.list.d/kubernetes.list"))
            .unwrap()
            .contains("/core:/stable:/v1.31/deb/"));
        assert!(host
            .file(&Path::new(KUBELET_DROPIN_DIR).join("proxy.conf"))
            .unwrap()
            .contains("http_proxy=http://proxy:3128"));
    }

    #[tokio::test]
    async fn test_redhat_install_disables_firewall_and_selinux() {
        let host = RecordingHost::default().respond("getenforce", "Enforcing");
        let fetcher = fetcher();
        let os = centos();
        let distro = for_family(os.family);
        let settings = node_settings(ContainerdSource::Distro);
        let node = Node {
            os: &os,
            settings: &settings,
            host: &host,
            fetcher: &fetcher,
            distro: distro.as_ref(),
        };

        install(&node).await.unwrap();

        let commands = host.commands();
        assert!(commands.contains(
            &"dnf install -y kubelet kubeadm kubectl --disableexcludes=kubernetes".to_string()
        ));
        assert!(commands.contains(&"systemctl disable --now firewalld".to_string()));
        assert!(commands.contains(&"setenforce 0".to_string()));
        assert!(host.has_file(Path::new("/etc/yum.repos.d/kubernetes.repo")));
    }

    #[tokio::test]
    async fn test_tarball_variant_leaves_selinux_enforcing() {
        let host = RecordingHost::default();
        let fetcher = fetcher();
        let os = centos();
        let distro = for_family(os.family);
        let settings = node_settings(ContainerdSource::Tarball);
        let node = Node {
            os: &os,
            settings: &settings,
            host: &host,
            fetcher: &fetcher,
            distro: distro.as_ref(),
        };

        install(&node).await.unwrap();
        assert!(!host.commands().iter().any(|c| c.contains("setenforce")));
    }

    #[tokio::test]
    async fn test_channel_lookup_failure_stops_before_packages() {
        let host = RecordingHost::default();
        let fetcher = CannedFetcher::default();
        let os = debian();
        let distro = for_family(os.family);
        let settings = node_settings(ContainerdSource::Tarball);
        let node = Node {
            os: &os,
            settings: &settings,
            host: &host,
            fetcher: &fetcher,
            distro: distro.as_ref(),
        };

        let err = install(&node).await.unwrap_err();
        assert!(err.to_string().contains("stable Kubernetes release"));
        assert_eq!(host.commands(), vec!["sysctl --system"]);
    }

    #[test]
    fn test_uninstall() {
        let host = RecordingHost::default()
            .with_file(SYSCTL_PATH, SYSCTL_SETTINGS)
            .with_file("/etc/systemd/system/kubelet.service.d/proxy.conf", "[Service]");
        let fetcher = CannedFetcher::default();
        let os = debian();
        let distro = for_family(os.family);
        let settings = node_settings(ContainerdSource::Tarball);
        let node = Node {
            os: &os,
            settings: &settings,
            host: &host,
            fetcher: &fetcher,
            distro: distro.as_ref(),
        };

        uninstall(&node).unwrap();

        assert!(host.files().is_empty());
        assert_eq!(
            host.commands(),
            vec![
                "systemctl daemon-reload",
                "DEBIAN_FRONTEND=noninteractive apt-get remove -y --allow-change-held-packages kubelet kubeadm kubectl",
                "sysctl --system",
            ]
        );
    }
}
