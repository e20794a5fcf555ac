//! Provision and tear down a single-node Kubernetes cluster for Kata
//! Containers CI.
//!
//! `install` runs containerd → Kubernetes packages → kubeadm bootstrap →
//! nydus snapshotter, stopping at the first failure. `uninstall` walks the
//! same steps backwards after a best-effort service shutdown.

pub mod cli;
pub mod commands;
pub mod config;
pub mod node;
pub mod orchestrator;
pub mod provision;

#[cfg(test)]
mod testing;

pub use cli::Cli;
pub use node::Node;
