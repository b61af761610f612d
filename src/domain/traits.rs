//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::value::RawValue;

use super::error::{AppError, NodeError};
use super::types::FeeSchedule;

/// A single upstream full node speaking JSON-RPC
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Address used to identify the node in logs
    fn address(&self) -> &str;

    /// Issue one RPC call and return the node's `result` exactly as sent
    async fn call(&self, method: &str, params: &Value) -> Result<Box<RawValue>, NodeError>;
}

/// Source of fee schedules, keyed by an optional profile name
#[async_trait]
pub trait FeeScheduleProvider: Send + Sync {
    /// Load the schedule for `profile`, or the default schedule when `None`
    async fn load(&self, profile: Option<&str>) -> Result<FeeSchedule, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConfigError;

    struct EchoNode;

    #[async_trait]
    impl NodeClient for EchoNode {
        fn address(&self) -> &str {
            "echo:0"
        }

        async fn call(&self, method: &str, params: &Value) -> Result<Box<RawValue>, NodeError> {
            serde_json::value::to_raw_value(&serde_json::json!({ "method": method, "params": params }))
                .map_err(|e| NodeError::InvalidResponse(e.to_string()))
        }
    }

    struct NoProfiles;

    #[async_trait]
    impl FeeScheduleProvider for NoProfiles {
        async fn load(&self, profile: Option<&str>) -> Result<FeeSchedule, AppError> {
            Err(ConfigError::Missing(profile.unwrap_or("default").to_string()).into())
        }
    }

    #[tokio::test]
    async fn test_node_client_is_object_safe() {
        let node: Box<dyn NodeClient> = Box::new(EchoNode);
        let result = node
            .call("getblockchaininfo", &serde_json::json!([]))
            .await
            .unwrap();
        let result: Value = serde_json::from_str(result.get()).unwrap();
        assert_eq!(result["method"], "getblockchaininfo");
        assert_eq!(node.address(), "echo:0");
    }

    #[tokio::test]
    async fn test_fee_provider_error_propagates() {
        let provider: Box<dyn FeeScheduleProvider> = Box::new(NoProfiles);
        let result = provider.load(Some("gold")).await;
        assert!(matches!(result, Err(AppError::Config(ConfigError::Missing(p))) if p == "gold"));
    }
}
