//! Application state management.

use std::sync::Arc;

use crate::infra::EnvelopeSigner;

use super::service::GatewayService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GatewayService>,
    /// Signs every successful payload before it leaves the gateway
    pub signer: Arc<EnvelopeSigner>,
}

impl AppState {
    /// Create a new application state with unsigned envelopes
    #[must_use]
    pub fn new(service: Arc<GatewayService>) -> Self {
        Self {
            service,
            signer: Arc::new(EnvelopeSigner::unsigned()),
        }
    }

    /// Replace the envelope signer (builder pattern)
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<EnvelopeSigner>) -> Self {
        self.signer = signer;
        self
    }
}
