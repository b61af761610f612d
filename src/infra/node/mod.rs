//! Upstream full node connections.

pub mod pool;
pub mod rpc;

pub use pool::{NodeConfig, NodePool, NodePoolConfig};
pub use rpc::HttpNodeClient;
