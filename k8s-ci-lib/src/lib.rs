//! Building blocks for provisioning a single-node Kubernetes cluster for
//! Kata Containers CI.
//!
//! - OS identity detection (`/etc/os-release`)
//! - A [`Host`] seam for every command and file mutation
//! - Distribution capability sets (Debian and RedHat families)
//! - Upstream release queries (containerd tags, Kubernetes stable channel)
//! - systemd proxy drop-in snippets

pub mod command;
pub mod distro;
pub mod error;
pub mod fetch;
pub mod host;
pub mod os;
pub mod proxy;
pub mod version;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::Cmd;
pub use distro::{Distro, for_family};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use host::{DryRunHost, Host, SystemHost};
pub use os::{Family, OsIdentity};
pub use proxy::ProxySettings;
pub use version::VersionSelector;
