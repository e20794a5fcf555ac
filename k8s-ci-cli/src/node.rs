//! Everything a provisioning step needs, resolved once at startup

use crate::config::Settings;
use k8s_ci_lib::{Distro, Fetcher, Host, OsIdentity};

pub struct Node<'a> {
    pub os: &'a OsIdentity,
    pub settings: &'a Settings,
    pub host: &'a dyn Host,
    pub fetcher: &'a dyn Fetcher,
    pub distro: &'a dyn Distro,
}
