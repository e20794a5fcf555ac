pub mod cluster;

pub use cluster::{ClusterCommands, handle_cluster_command};
