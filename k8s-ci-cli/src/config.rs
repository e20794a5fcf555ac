//! Settings resolution
//!
//! Precedence: CLI flags and environment (via clap), then the optional TOML
//! file, then built-in defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use k8s_ci_lib::{ProxySettings, VersionSelector};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_POD_NETWORK_CIDR: &str = "10.244.0.0/16";
pub const DEFAULT_FLANNEL_MANIFEST: &str =
    "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml";
pub const DEFAULT_KATA_REPO: &str = "https://github.com/kata-containers/kata-containers.git";
pub const DEFAULT_CLONE_PATH: &str = "/tmp/kata-containers";
pub const DEFAULT_HYPERVISOR: &str = "qemu-coco-dev";

/// Where containerd comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContainerdSource {
    /// Upstream release tarball extracted under /usr/local
    #[default]
    Tarball,
    /// The distribution's package repository
    Distro,
}

impl std::fmt::Display for ContainerdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerdSource::Tarball => f.write_str("tarball"),
            ContainerdSource::Distro => f.write_str("distro"),
        }
    }
}

/// Sub-command of the kata deployment script that removes the snapshotter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalSubcommand {
    #[default]
    CleanupSnapshotter,
    DeleteSnapshotter,
}

impl RemovalSubcommand {
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalSubcommand::CleanupSnapshotter => "cleanup-snapshotter",
            RemovalSubcommand::DeleteSnapshotter => "delete-snapshotter",
        }
    }
}

/// Optional settings file layout
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub containerd_source: Option<ContainerdSource>,
    pub containerd_version: Option<String>,
    pub install_runc: Option<bool>,
    pub selinux_permissive: Option<bool>,
    pub pod_network_cidr: Option<String>,
    pub flannel_manifest_url: Option<String>,
    pub nydus: NydusFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NydusFileConfig {
    pub repo_url: Option<String>,
    pub clone_path: Option<PathBuf>,
    pub hypervisor: Option<String>,
    pub removal_subcommand: Option<RemovalSubcommand>,
}

/// Load settings overrides from a TOML file (`~` is expanded)
pub fn load_config(config_path: &Path) -> Result<FileConfig> {
    let expanded = shellexpand::tilde(&config_path.to_string_lossy()).into_owned();
    let content = std::fs::read_to_string(&expanded)
        .with_context(|| format!("Failed to read {expanded}"))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse {expanded}"))
}

/// Values taken from flags or the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub containerd_source: Option<ContainerdSource>,
    pub containerd_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NydusSettings {
    pub repo_url: String,
    pub clone_path: PathBuf,
    pub hypervisor: String,
    pub removal_subcommand: RemovalSubcommand,
}

/// The user whose home receives the kubeconfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    pub home: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

impl InvokingUser {
    pub fn current() -> Result<Self> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        // SAFETY: getuid/getgid have no preconditions and cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Ok(Self { home, uid, gid })
    }

    pub fn kube_dir(&self) -> PathBuf {
        self.home.join(".kube")
    }

    pub fn kubeconfig(&self) -> PathBuf {
        self.kube_dir().join("config")
    }
}

/// Fully resolved configuration, computed once and passed to every step
#[derive(Debug, Clone)]
pub struct Settings {
    pub containerd_source: ContainerdSource,
    pub containerd_version: VersionSelector,
    pub install_runc: bool,
    pub selinux_permissive: bool,
    pub pod_network_cidr: String,
    pub flannel_manifest_url: String,
    /// Architecture as spelled in release artifact names
    pub arch: String,
    pub nydus: NydusSettings,
    pub proxy: ProxySettings,
    pub user: InvokingUser,
}

impl Settings {
    pub fn resolve(
        overrides: &Overrides,
        file: FileConfig,
        proxy: ProxySettings,
        user: InvokingUser,
    ) -> Self {
        let containerd_source = overrides
            .containerd_source
            .or(file.containerd_source)
            .unwrap_or_default();
        let containerd_version = overrides
            .containerd_version
            .clone()
            .or(file.containerd_version)
            .map(|version| version.parse::<VersionSelector>().unwrap_or_default())
            .unwrap_or_default();

        Self {
            containerd_source,
            containerd_version,
            install_runc: file.install_runc.unwrap_or(true),
            // package installs follow the upstream kubeadm guide for RHEL
            selinux_permissive: file
                .selinux_permissive
                .unwrap_or(containerd_source == ContainerdSource::Distro),
            pod_network_cidr: file
                .pod_network_cidr
                .unwrap_or_else(|| DEFAULT_POD_NETWORK_CIDR.to_string()),
            flannel_manifest_url: file
                .flannel_manifest_url
                .unwrap_or_else(|| DEFAULT_FLANNEL_MANIFEST.to_string()),
            arch: release_arch(std::env::consts::ARCH).to_string(),
            nydus: NydusSettings {
                repo_url: file
                    .nydus
                    .repo_url
                    .unwrap_or_else(|| DEFAULT_KATA_REPO.to_string()),
                clone_path: file
                    .nydus
                    .clone_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CLONE_PATH)),
                hypervisor: file
                    .nydus
                    .hypervisor
                    .unwrap_or_else(|| DEFAULT_HYPERVISOR.to_string()),
                removal_subcommand: file.nydus.removal_subcommand.unwrap_or_default(),
            },
            proxy,
            user,
        }
    }
}

/// Map Rust target architecture names to the ones used by release tarballs
pub fn release_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64le",
        other => other,
    }
}
