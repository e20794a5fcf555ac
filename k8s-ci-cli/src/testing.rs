//! Shared fixtures for provisioner tests

use crate::config::{ContainerdSource, FileConfig, InvokingUser, Overrides, Settings};
use k8s_ci_lib::{OsIdentity, ProxySettings};

pub fn debian() -> OsIdentity {
    OsIdentity::parse("ID=ubuntu\nID_LIKE=debian\nNAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\n")
        .expect("ubuntu fixture parses")
}

pub fn centos() -> OsIdentity {
    OsIdentity::parse("ID=\"centos\"\nID_LIKE=\"rhel fedora\"\nNAME=\"CentOS Stream\"\n")
        .expect("centos fixture parses")
}

/// Default settings for a CI user with no proxy, on amd64
pub fn node_settings(source: ContainerdSource) -> Settings {
    let overrides = Overrides {
        containerd_source: Some(source),
        containerd_version: None,
    };
    let user = InvokingUser {
        home: "/home/ci".into(),
        uid: 1001,
        gid: 121,
    };
    let mut settings = Settings::resolve(
        &overrides,
        FileConfig::default(),
        ProxySettings::default(),
        user,
    );
    settings.arch = "amd64".to_string();
    settings
}
