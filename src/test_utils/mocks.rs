//! Mock implementations for testing.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::{
    AppError, ConfigError, FeeSchedule, FeeScheduleProvider, NodeClient, NodeError,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
    /// Artificial latency applied before answering
    pub delay: Option<Duration>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
            delay: None,
        }
    }

    #[must_use]
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

type Scripted = Result<Value, NodeError>;

/// Mock node answering from scripted responses.
///
/// Responses are looked up first by `(method, first param)` and then by
/// `method`; anything unscripted answers with an RPC "method not found".
pub struct MockNodeClient {
    address: String,
    config: MockConfig,
    by_method: Mutex<HashMap<String, Scripted>>,
    by_param: Mutex<HashMap<(String, String), Scripted>>,
    calls: Mutex<Vec<(String, Value)>>,
    call_count: AtomicUsize,
}

impl MockNodeClient {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_config(address, MockConfig::success())
    }

    #[must_use]
    pub fn with_config(address: impl Into<String>, config: MockConfig) -> Self {
        Self {
            address: address.into(),
            config,
            by_method: Mutex::new(HashMap::new()),
            by_param: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Node whose every call fails at the transport level
    #[must_use]
    pub fn failing(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_config(address, MockConfig::failure(message))
    }

    #[must_use]
    pub fn with_response(self, method: &str, result: Value) -> Self {
        self.by_method
            .lock()
            .unwrap()
            .insert(method.to_string(), Ok(result));
        self
    }

    #[must_use]
    pub fn with_error(self, method: &str, error: NodeError) -> Self {
        self.by_method
            .lock()
            .unwrap()
            .insert(method.to_string(), Err(error));
        self
    }

    /// Script a response for calls whose first parameter equals `key`
    #[must_use]
    pub fn with_response_for(self, method: &str, key: &str, result: Value) -> Self {
        self.by_param
            .lock()
            .unwrap()
            .insert((method.to_string(), key.to_string()), Ok(result));
        self
    }

    #[must_use]
    pub fn with_error_for(self, method: &str, key: &str, error: NodeError) -> Self {
        self.by_param
            .lock()
            .unwrap()
            .insert((method.to_string(), key.to_string()), Err(error));
        self
    }

    /// Total calls received
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Calls received for one method
    pub fn calls_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    fn lookup(&self, method: &str, params: &Value) -> Scripted {
        let key = params
            .get(0)
            .and_then(Value::as_str)
            .map(|k| (method.to_string(), k.to_string()));
        if let Some(key) = key
            && let Some(scripted) = self.by_param.lock().unwrap().get(&key)
        {
            return scripted.clone();
        }
        self.by_method
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_else(|| {
                Err(NodeError::Rpc {
                    code: -32601,
                    message: "Method not found".to_string(),
                })
            })
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: &str, params: &Value) -> Result<Box<RawValue>, NodeError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        if let Some(delay) = self.config.delay {
            tokio::time::sleep(delay).await;
        }

        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(NodeError::Connection(msg));
        }

        let result = self.lookup(method, params)?;
        serde_json::value::to_raw_value(&result)
            .map_err(|e| NodeError::InvalidResponse(e.to_string()))
    }
}

/// Mock fee schedule store keyed by profile
#[derive(Default)]
pub struct MockFeeScheduleProvider {
    default: Option<FeeSchedule>,
    profiles: HashMap<String, FeeSchedule>,
    loads: AtomicUsize,
}

impl MockFeeScheduleProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default(mut self, schedule: FeeSchedule) -> Self {
        self.default = Some(schedule);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, name: &str, schedule: FeeSchedule) -> Self {
        self.profiles.insert(name.to_string(), schedule);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FeeScheduleProvider for MockFeeScheduleProvider {
    async fn load(&self, profile: Option<&str>) -> Result<FeeSchedule, AppError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let schedule = match profile {
            Some(name) => self.profiles.get(name),
            None => self.default.as_ref(),
        };
        schedule.cloned().ok_or_else(|| {
            AppError::Config(ConfigError::Missing(format!(
                "fee schedule for profile '{}'",
                profile.unwrap_or("default")
            )))
        })
    }
}
