//! Provisioning steps, each a short linear sequence of host operations

pub mod cluster;
pub mod containerd;
pub mod kubernetes;
pub mod nydus;

pub use nydus::NydusDeployer;
