//! Merchant gateway for a pool of bitcoin full nodes.
//!
//! Every RPC is broadcast to all configured nodes and the answers are
//! reconciled into one. Submitted transactions are checked against a fee
//! schedule before they are relayed.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
