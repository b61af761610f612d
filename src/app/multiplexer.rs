//! Concurrent fan-out of one RPC call to every node in the pool.
//!
//! Each node is called from its own task. Results are drained from the
//! [`JoinSet`] by a single collector, so the [`ResponseSet`] is only ever
//! touched from one place and entries land in completion order.
//!
//! Node results are stored as the exact JSON text each node sent. JSON text
//! never begins with `E`, so a genuine payload can't be mistaken for an
//! `ERROR: ` marker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::domain::{ERROR_PREFIX, Invocation, NodeError, ResponseSet};
use crate::infra::NodePool;

/// Default per-node call deadline
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Default cap on node calls in flight across the process
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 64;

#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    pub call_timeout: Duration,
    pub max_concurrent_calls: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
        }
    }
}

impl MultiplexerConfig {
    pub fn from_env() -> Self {
        use std::env;

        let call_timeout_secs = env::var("NODE_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);

        let max_concurrent_calls = env::var("MAX_CONCURRENT_NODE_CALLS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_CALLS);

        Self {
            call_timeout: Duration::from_secs(call_timeout_secs),
            max_concurrent_calls,
        }
    }
}

/// Broadcasts invocations to the node pool and gathers the answers
#[derive(Clone)]
pub struct Multiplexer {
    pool: NodePool,
    limiter: Arc<Semaphore>,
    call_timeout: Duration,
}

impl Multiplexer {
    #[must_use]
    pub fn new(pool: NodePool, config: MultiplexerConfig) -> Self {
        Self {
            pool,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1))),
            call_timeout: config.call_timeout,
        }
    }

    /// Number of nodes each invocation is sent to
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.pool.len()
    }

    /// Send `invocation` to every node and wait for all of them.
    ///
    /// Failed nodes contribute an `ERROR: <message>` entry when
    /// `include_errors` is set and nothing otherwise. With `unique`, an entry
    /// is kept only if no byte-identical entry is already present.
    #[instrument(skip(self, invocation), fields(method = %invocation.method))]
    pub async fn invoke(
        &self,
        invocation: &Invocation,
        include_errors: bool,
        unique: bool,
    ) -> ResponseSet {
        let method: Arc<str> = Arc::from(invocation.method.as_str());
        let params = Arc::new(invocation.params.clone());
        let deadline = self.call_timeout;

        let mut tasks = JoinSet::new();
        for client in self.pool.clients() {
            let client = Arc::clone(client);
            let limiter = Arc::clone(&self.limiter);
            let method = Arc::clone(&method);
            let params = Arc::clone(&params);

            tasks.spawn(async move {
                let outcome = match limiter.acquire_owned().await {
                    Ok(_permit) => match timeout(deadline, client.call(&method, &params)).await {
                        Ok(result) => result,
                        Err(_) => Err(NodeError::Timeout(deadline.as_millis() as u64)),
                    },
                    Err(_) => Err(NodeError::Connection("call limiter closed".to_string())),
                };
                (client.address().to_string(), outcome)
            });
        }

        let mut responses = ResponseSet::new();
        while let Some(joined) = tasks.join_next().await {
            let (address, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "Node call task aborted");
                    if include_errors {
                        responses.push(format!("{}task aborted: {}", ERROR_PREFIX, e), unique);
                    }
                    continue;
                }
            };

            match outcome {
                Ok(result) => {
                    let added = responses.push(result.get().to_string(), unique);
                    debug!(node = %address, added, "Node answered");
                }
                Err(err) => {
                    warn!(node = %address, method = %method, error = %err, "Node call failed");
                    if include_errors {
                        responses.push(format!("{}{}", ERROR_PREFIX, err), unique);
                    }
                }
            }
        }

        responses
    }
}
