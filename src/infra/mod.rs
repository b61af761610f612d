//! Infrastructure layer implementations.

pub mod fees;
pub mod node;
pub mod signing;

pub use fees::FileFeeScheduleStore;
pub use node::{HttpNodeClient, NodeConfig, NodePool, NodePoolConfig};
pub use signing::{EnvelopeSigner, miner_key_from_secret};
