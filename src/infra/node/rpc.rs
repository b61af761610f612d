//! JSON-RPC client for a single full node.
//!
//! Speaks the bitcoind dialect: HTTP POST with basic auth, a `{result, error, id}`
//! envelope, and RPC errors delivered alongside non-2xx status codes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::{debug, instrument};

use crate::domain::{AppError, ConfigError, NodeClient, NodeError};

use super::pool::NodeConfig;

/// Longest response body quoted back in an invalid-response error
const MAX_BODY_EXCERPT: usize = 200;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC connection to one node
pub struct HttpNodeClient {
    http_client: Client,
    url: String,
    address: String,
    username: String,
    password: SecretString,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    pub fn new(config: &NodeConfig, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::Config(ConfigError::Invalid {
                key: "http_client".to_string(),
                message: e.to_string(),
            })
        })?;

        Ok(Self {
            http_client,
            url: config.url(),
            address: config.address(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> NodeError {
        if err.is_timeout() {
            NodeError::Timeout(self.timeout.as_millis() as u64)
        } else {
            NodeError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    fn address(&self) -> &str {
        &self.address
    }

    #[instrument(skip(self, params), fields(node = %self.address))]
    async fn call(&self, method: &str, params: &Value) -> Result<Box<RawValue>, NodeError> {
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http_client
            .post(&self.url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        // bitcoind reports RPC errors with HTTP 500 and a JSON body, so the
        // body is decoded regardless of status.
        let rpc_response: JsonRpcResponse = serde_json::from_str(&body).map_err(|_| {
            let excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
            NodeError::InvalidResponse(format!("HTTP {}: {}", status, excerpt.trim()))
        })?;

        if let Some(error) = rpc_response.error {
            debug!(code = error.code, message = %error.message, "Node returned RPC error");
            return Err(NodeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        // `null` results deserialize as `None`
        match rpc_response.result {
            Some(result) => Ok(result),
            None => serde_json::value::to_raw_value(&Value::Null)
                .map_err(|e| NodeError::InvalidResponse(e.to_string())),
        }
    }
}
