//! Package-manager specific capabilities
//!
//! Provisioners talk to a [`Distro`] instead of branching on the OS family
//! themselves. Each capability is a short sequence of host commands.

use crate::command::Cmd;
use crate::error::Result;
use crate::host::Host;
use crate::os::Family;
use std::path::Path;
use tracing::info;

pub const KUBERNETES_PACKAGES: [&str; 3] = ["kubelet", "kubeadm", "kubectl"];

/// Low-level OCI runtime shipped alongside tarball installs of containerd
pub const RUNTIME_PACKAGE: &str = "runc";

pub trait Distro {
    fn install_runtime_package(&self, host: &dyn Host) -> Result<()>;

    fn remove_runtime_package(&self, host: &dyn Host) -> Result<()>;

    /// Install containerd from the distribution (or vendor) repository
    fn install_containerd_package(&self, host: &dyn Host) -> Result<()>;

    fn remove_containerd_package(&self, host: &dyn Host) -> Result<()>;

    /// Register the pkgs.k8s.io repository for a `vMAJOR.MINOR` channel
    fn register_kubernetes_repository(&self, host: &dyn Host, channel: &str) -> Result<()>;

    fn unregister_kubernetes_repository(&self, host: &dyn Host) -> Result<()>;

    /// Install kubelet, kubeadm and kubectl, pinned against upgrades
    fn install_kubernetes_packages(&self, host: &dyn Host) -> Result<()>;

    /// Remove kubelet, kubeadm and kubectl, pinned or not
    fn remove_kubernetes_packages(&self, host: &dyn Host) -> Result<()>;

    /// Stop the host firewall so cluster traffic is not filtered
    fn disable_firewall(&self, host: &dyn Host) -> Result<()>;

    fn set_selinux_permissive(&self, host: &dyn Host) -> Result<()>;
}

pub fn for_family(family: Family) -> Box<dyn Distro> {
    match family {
        Family::Debian => Box::new(Debian),
        Family::RedHat => Box::new(RedHat),
    }
}

pub const APT_KEYRING: &str = "/etc/apt/keyrings/kubernetes-apt-keyring.gpg";
pub const APT_SOURCE_LIST: &str = "/etc/apt/sources.list.d/kubernetes.list";
const APT_RELEASE_KEY_TMP: &str = "/tmp/kubernetes-release.key";

#[derive(Debug, Clone, Copy, Default)]
pub struct Debian;

impl Debian {
    fn apt_get<I, S>(args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::sudo("apt-get")
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
    }

    fn install(host: &dyn Host, packages: &[&str]) -> Result<()> {
        host.run(&Self::apt_get(["update"]))?;
        host.run(&Self::apt_get(["install", "-y"]).args(packages.iter().copied()))
    }
}

impl Distro for Debian {
    fn install_runtime_package(&self, host: &dyn Host) -> Result<()> {
        Self::install(host, &[RUNTIME_PACKAGE])
    }

    fn remove_runtime_package(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::apt_get(["remove", "-y", RUNTIME_PACKAGE]))
    }

    fn install_containerd_package(&self, host: &dyn Host) -> Result<()> {
        Self::install(host, &["containerd"])
    }

    fn remove_containerd_package(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::apt_get(["remove", "-y", "containerd"]))
    }

    fn register_kubernetes_repository(&self, host: &dyn Host, channel: &str) -> Result<()> {
        let base = format!("https://pkgs.k8s.io/core:/stable:/{channel}/deb/");

        Self::install(host, &["apt-transport-https", "ca-certificates", "curl", "gpg"])?;
        host.create_dir_all(Path::new("/etc/apt/keyrings"))?;
        host.run(
            &Cmd::new("curl")
                .args(["-fsSL", "-o", APT_RELEASE_KEY_TMP])
                .arg(format!("{base}Release.key")),
        )?;
        host.run(&Cmd::sudo("gpg").args([
            "--batch",
            "--yes",
            "--dearmor",
            "-o",
            APT_KEYRING,
            APT_RELEASE_KEY_TMP,
        ]))?;
        host.remove_file(Path::new(APT_RELEASE_KEY_TMP))?;
        host.write_file(
            Path::new(APT_SOURCE_LIST),
            &format!("deb [signed-by={APT_KEYRING}] {base} /\n"),
        )?;
        host.run(&Self::apt_get(["update"]))
    }

    fn unregister_kubernetes_repository(&self, host: &dyn Host) -> Result<()> {
        host.remove_file(Path::new(APT_SOURCE_LIST))?;
        host.remove_file(Path::new(APT_KEYRING))
    }

    fn install_kubernetes_packages(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::apt_get(["install", "-y"]).args(KUBERNETES_PACKAGES))?;
        host.run(&Cmd::sudo("apt-mark").arg("hold").args(KUBERNETES_PACKAGES))
    }

    fn remove_kubernetes_packages(&self, host: &dyn Host) -> Result<()> {
        host.run(
            &Self::apt_get(["remove", "-y", "--allow-change-held-packages"])
                .args(KUBERNETES_PACKAGES),
        )
    }

    fn disable_firewall(&self, _host: &dyn Host) -> Result<()> {
        Ok(())
    }

    fn set_selinux_permissive(&self, _host: &dyn Host) -> Result<()> {
        Ok(())
    }
}

pub const DOCKER_CE_REPO: &str = "https://download.docker.com/linux/centos/docker-ce.repo";
/// Where `dnf config-manager --add-repo` stores [`DOCKER_CE_REPO`]
pub const DOCKER_CE_REPO_FILE: &str = "/etc/yum.repos.d/docker-ce.repo";
pub const YUM_REPO_FILE: &str = "/etc/yum.repos.d/kubernetes.repo";
const SELINUX_CONFIG: &str = "/etc/selinux/config";

#[derive(Debug, Clone, Copy, Default)]
pub struct RedHat;

impl RedHat {
    fn dnf<I, S>(args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Cmd::sudo("dnf").args(args)
    }

    fn repo_definition(channel: &str) -> String {
        let base = format!("https://pkgs.k8s.io/core:/stable:/{channel}/rpm/");
        format!(
            "[kubernetes]\n\
             name=Kubernetes\n\
             baseurl={base}\n\
             enabled=1\n\
             gpgcheck=1\n\
             gpgkey={base}repodata/repomd.xml.key\n\
             exclude=kubelet kubeadm kubectl cri-tools kubernetes-cni\n"
        )
    }
}

impl Distro for RedHat {
    fn install_runtime_package(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::dnf(["install", "-y", RUNTIME_PACKAGE]))
    }

    fn remove_runtime_package(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::dnf(["remove", "-y", RUNTIME_PACKAGE]))
    }

    fn install_containerd_package(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::dnf(["install", "-y", "dnf-plugins-core"]))?;
        host.run(&Self::dnf(["config-manager", "--add-repo", DOCKER_CE_REPO]))?;
        host.run(&Self::dnf(["install", "-y", "containerd.io"]))
    }

    fn remove_containerd_package(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::dnf(["remove", "-y", "containerd.io"]))?;
        host.remove_file(Path::new(DOCKER_CE_REPO_FILE))
    }

    fn register_kubernetes_repository(&self, host: &dyn Host, channel: &str) -> Result<()> {
        host.write_file(Path::new(YUM_REPO_FILE), &Self::repo_definition(channel))
    }

    fn unregister_kubernetes_repository(&self, host: &dyn Host) -> Result<()> {
        host.remove_file(Path::new(YUM_REPO_FILE))
    }

    fn install_kubernetes_packages(&self, host: &dyn Host) -> Result<()> {
        // the repository excludes these packages so a plain `dnf upgrade` leaves them alone
        host.run(
            &Self::dnf(["install", "-y"])
                .args(KUBERNETES_PACKAGES)
                .arg("--disableexcludes=kubernetes"),
        )
    }

    fn remove_kubernetes_packages(&self, host: &dyn Host) -> Result<()> {
        host.run(&Self::dnf(["remove", "-y"]).args(KUBERNETES_PACKAGES))
    }

    fn disable_firewall(&self, host: &dyn Host) -> Result<()> {
        host.run(&Cmd::sudo("systemctl").args(["disable", "--now", "firewalld"]))
    }

    fn set_selinux_permissive(&self, host: &dyn Host) -> Result<()> {
        let mode = host.output(&Cmd::new("getenforce"))?;
        if mode.trim().eq_ignore_ascii_case("disabled") {
            info!("SELinux is disabled, leaving it alone");
            return Ok(());
        }
        host.run(&Cmd::sudo("setenforce").arg("0"))?;
        host.run(&Cmd::sudo("sed").args([
            "-i",
            "s/^SELINUX=enforcing$/SELINUX=permissive/",
            SELINUX_CONFIG,
        ]))
    }
}
