//! Node pool construction from `BITCOIN_*` settings.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::info;

use crate::domain::{AppError, ConfigError, NodeClient};

use super::rpc::HttpNodeClient;

/// Connection settings for one node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl NodeConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Settings for every node in the pool
#[derive(Debug, Clone)]
pub struct NodePoolConfig {
    pub nodes: Vec<NodeConfig>,
}

impl NodePoolConfig {
    /// Read `BITCOIN_COUNT` and `BITCOIN_{i}_HOST|PORT|USERNAME|PASSWORD` for `i` in `1..=count`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: String| -> Result<String, ConfigError> {
            lookup(&key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let count_raw = required("BITCOIN_COUNT".to_string())?;
        let count: usize = count_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "BITCOIN_COUNT".to_string(),
            message: format!("'{}' is not a node count", count_raw),
        })?;
        if count == 0 {
            return Err(ConfigError::Invalid {
                key: "BITCOIN_COUNT".to_string(),
                message: "at least one node is required".to_string(),
            });
        }

        let mut nodes = Vec::with_capacity(count);
        for i in 1..=count {
            let port_key = format!("BITCOIN_{}_PORT", i);
            let port_raw = required(port_key.clone())?;
            let port = port_raw.parse().map_err(|_| ConfigError::Invalid {
                key: port_key,
                message: format!("'{}' is not a port", port_raw),
            })?;

            nodes.push(NodeConfig {
                host: required(format!("BITCOIN_{}_HOST", i))?,
                port,
                username: required(format!("BITCOIN_{}_USERNAME", i))?,
                password: SecretString::from(required(format!("BITCOIN_{}_PASSWORD", i))?),
            });
        }

        Ok(Self { nodes })
    }
}

/// Immutable set of node clients shared by every request
#[derive(Clone)]
pub struct NodePool {
    clients: Vec<Arc<dyn NodeClient>>,
}

impl NodePool {
    #[must_use]
    pub fn new(clients: Vec<Arc<dyn NodeClient>>) -> Self {
        Self { clients }
    }

    /// Build HTTP clients for every configured node.
    pub fn connect(config: &NodePoolConfig, call_timeout: Duration) -> Result<Self, AppError> {
        let mut clients: Vec<Arc<dyn NodeClient>> = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            clients.push(Arc::new(HttpNodeClient::new(node, call_timeout)?));
            info!(node = %node.address(), "Node client configured");
        }
        Ok(Self { clients })
    }

    #[must_use]
    pub fn clients(&self) -> &[Arc<dyn NodeClient>] {
        &self.clients
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
