//! containerd runtime: upstream tarball or distribution package

use crate::config::ContainerdSource;
use crate::node::Node;
use anyhow::{Context, Result};
use k8s_ci_lib::proxy::{self, daemon_reload};
use k8s_ci_lib::{Cmd, Host};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_DIR: &str = "/etc/containerd";
pub const CONFIG_PATH: &str = "/etc/containerd/config.toml";
pub const UNIT_PATH: &str = "/etc/systemd/system/containerd.service";
pub const DROPIN_DIR: &str = "/etc/systemd/system/containerd.service.d";
pub const MODULES_LOAD_PATH: &str = "/etc/modules-load.d/containerd.conf";
pub const KERNEL_MODULES: [&str; 2] = ["overlay", "br_netfilter"];
pub const INSTALL_PREFIX: &str = "/usr/local";

/// Files the release tarball places under `/usr/local/bin`
pub const BINARIES: [&str; 6] = [
    "containerd",
    "containerd-shim",
    "containerd-shim-runc-v1",
    "containerd-shim-runc-v2",
    "containerd-stress",
    "ctr",
];

pub const STATE_DIRS: [&str; 3] = [CONFIG_DIR, "/var/lib/containerd", "/run/containerd"];

const RELEASES_BASE: &str = "https://github.com/containerd/containerd/releases/download";
const SOURCE_BASE: &str = "https://raw.githubusercontent.com/containerd/containerd";

pub fn tarball_name(version: &str, arch: &str) -> String {
    format!(
        "containerd-{}-linux-{arch}.tar.gz",
        version.trim_start_matches('v')
    )
}

pub fn tarball_url(version: &str, arch: &str) -> String {
    format!("{RELEASES_BASE}/{version}/{}", tarball_name(version, arch))
}

pub fn unit_url(version: &str) -> String {
    format!("{SOURCE_BASE}/{version}/containerd.service")
}

/// Force the systemd cgroup driver in a `containerd config default` dump
pub fn with_systemd_cgroup(config: &str) -> String {
    config.replace("SystemdCgroup = false", "SystemdCgroup = true")
}

pub async fn install(node: &Node<'_>) -> Result<()> {
    match node.settings.containerd_source {
        ContainerdSource::Tarball => install_from_tarball(node).await?,
        ContainerdSource::Distro => install_from_package(node)?,
    }

    proxy::write_snippet(node.host, &node.settings.proxy, Path::new(DROPIN_DIR))
        .context("Failed to write containerd proxy snippet")?;
    load_kernel_modules(node.host)?;
    node.host
        .run(&Cmd::sudo("systemctl").args(["enable", "--now", "containerd"]))?;
    Ok(())
}

async fn install_from_tarball(node: &Node<'_>) -> Result<()> {
    let host = node.host;
    // a bad version must abort before anything is downloaded
    let version = node
        .settings
        .containerd_version
        .resolve(node.fetcher)
        .await?;
    info!("Installing containerd {version} from release tarball");

    if node.settings.install_runc {
        node.distro
            .install_runtime_package(host)
            .context("Failed to install runc")?;
    }

    let archive: PathBuf = std::env::temp_dir().join(tarball_name(&version, &node.settings.arch));
    let archive_arg = archive.display().to_string();
    host.run(
        &Cmd::new("curl")
            .args(["-fsSL", "-o", archive_arg.as_str()])
            .arg(tarball_url(&version, &node.settings.arch)),
    )
    .context("Failed to download containerd release")?;
    host.run(&Cmd::sudo("tar").args(["-C", INSTALL_PREFIX, "-xzf", archive_arg.as_str()]))?;
    host.remove_file(&archive)?;

    write_default_config(host, false)?;

    let unit = node
        .fetcher
        .get_text(&unit_url(&version))
        .await
        .context("Failed to fetch containerd.service")?;
    host.write_file(Path::new(UNIT_PATH), &unit)?;
    daemon_reload(host)?;
    Ok(())
}

fn install_from_package(node: &Node<'_>) -> Result<()> {
    info!("Installing containerd from {} packages", node.os.name);
    node.distro
        .install_containerd_package(node.host)
        .context("Failed to install containerd package")?;
    write_default_config(node.host, true)
}

fn write_default_config(host: &dyn Host, systemd_cgroup: bool) -> Result<()> {
    let mut config = host
        .output(&Cmd::new("containerd").args(["config", "default"]))
        .context("Failed to generate default containerd config")?;
    if systemd_cgroup {
        config = with_systemd_cgroup(&config);
    }
    host.create_dir_all(Path::new(CONFIG_DIR))?;
    host.write_file(Path::new(CONFIG_PATH), &config)?;
    Ok(())
}

fn load_kernel_modules(host: &dyn Host) -> Result<()> {
    let mut modules = KERNEL_MODULES.join("\n");
    modules.push('\n');
    host.write_file(Path::new(MODULES_LOAD_PATH), &modules)?;
    for module in KERNEL_MODULES {
        host.run(&Cmd::sudo("modprobe").arg(module))
            .with_context(|| format!("Failed to load kernel module {module}"))?;
    }
    Ok(())
}

pub fn uninstall(node: &Node<'_>) -> Result<()> {
    let host = node.host;
    proxy::remove_snippet(host, Path::new(DROPIN_DIR))?;

    match node.settings.containerd_source {
        ContainerdSource::Tarball => {
            for binary in BINARIES {
                host.remove_file(&Path::new(INSTALL_PREFIX).join("bin").join(binary))?;
            }
            host.remove_file(Path::new(UNIT_PATH))?;
            if node.settings.install_runc {
                node.distro
                    .remove_runtime_package(host)
                    .context("Failed to remove runc")?;
            }
        }
        ContainerdSource::Distro => node
            .distro
            .remove_containerd_package(host)
            .context("Failed to remove containerd package")?,
    }

    host.remove_file(Path::new(MODULES_LOAD_PATH))?;
    for dir in STATE_DIRS {
        host.remove_dir_all(Path::new(dir))?;
    }
    daemon_reload(host)?;
    Ok(())
}
