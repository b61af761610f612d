//! Application layer containing business logic and shared state.

pub mod block_info;
pub mod fee_policy;
pub mod multiplexer;
pub mod reconcile;
pub mod service;
pub mod state;

pub use block_info::{BlockInfoResolver, select_tip};
pub use fee_policy::{FeePolicyEngine, PrevTxPolicy};
pub use multiplexer::{Multiplexer, MultiplexerConfig};
pub use reconcile::reconcile;
pub use service::{GatewayConfig, GatewayService};
pub use state::AppState;
