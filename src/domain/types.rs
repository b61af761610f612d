//! Domain types shared by the multiplexer, policy engine and API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use super::error::ConfigError;

/// Merchant API version reported in every payload
pub const API_VERSION: &str = "0.1.0";

/// Marker prepended to synthetic error entries in a [`ResponseSet`]
pub const ERROR_PREFIX: &str = "ERROR: ";

pub const METHOD_GET_BLOCKCHAIN_INFO: &str = "getblockchaininfo";
pub const METHOD_GET_RAW_TRANSACTION: &str = "getrawtransaction";
pub const METHOD_SEND_RAW_TRANSACTION: &str = "sendrawtransaction";

// ============================================================================
// RPC INVOCATIONS
// ============================================================================

/// One logical RPC call: a method name and its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: String,
    pub params: Value,
}

impl Invocation {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params: Value::Array(params),
        }
    }

    #[must_use]
    pub fn blockchain_info() -> Self {
        Self::new(METHOD_GET_BLOCKCHAIN_INFO, Vec::new())
    }

    /// `getrawtransaction [txid, verbosity]`; verbosity 0 returns hex, 1 returns JSON.
    #[must_use]
    pub fn raw_transaction(txid: &str, verbose: bool) -> Self {
        Self::new(
            METHOD_GET_RAW_TRANSACTION,
            vec![Value::from(txid), Value::from(u8::from(verbose))],
        )
    }

    #[must_use]
    pub fn send_raw_transaction(raw_tx: &str, allow_high_fees: bool, dont_check_fee: bool) -> Self {
        Self::new(
            METHOD_SEND_RAW_TRANSACTION,
            vec![
                Value::from(raw_tx),
                Value::from(allow_high_fees),
                Value::from(dont_check_fee),
            ],
        )
    }
}

/// Raw payloads collected from one multiplexed call, in completion order.
///
/// Each entry is either the JSON text of a node's `result` or a synthetic
/// `ERROR: <message>` marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSet {
    entries: Vec<String>,
}

impl ResponseSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. With `unique`, byte-identical duplicates are dropped.
    /// Returns whether the entry was added.
    pub fn push(&mut self, entry: String, unique: bool) -> bool {
        if unique && self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ResponseSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Classification of a [`ResponseSet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciledOutcome {
    NoResults,
    SingleError(String),
    SingleSuccess(String),
    Mixed,
}

// ============================================================================
// NODE RESPONSE SHAPES
// ============================================================================

/// Chain tip as reported by `getblockchaininfo`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BlockInfo {
    #[serde(rename = "bestblockhash")]
    pub best_block_hash: String,
    #[serde(rename = "blocks")]
    pub height: u32,
}

/// Subset of verbose `getrawtransaction` output used for status queries
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawTransactionInfo {
    #[serde(default, rename = "blockhash")]
    pub block_hash: Option<String>,
    #[serde(default, rename = "blockheight")]
    pub block_height: Option<u32>,
    #[serde(default)]
    pub confirmations: u32,
}

// ============================================================================
// FEE SCHEDULE
// ============================================================================

/// Byte category a fee entry applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    Standard,
    Data,
}

/// A rate of `satoshis` per `bytes`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct FeeUnit {
    #[schema(example = 500)]
    pub satoshis: u64,
    #[schema(example = 1000)]
    pub bytes: u64,
}

impl FeeUnit {
    #[must_use]
    pub const fn new(satoshis: u64, bytes: u64) -> Self {
        Self { satoshis, bytes }
    }

    /// Fee owed for `byte_count` bytes at this rate, rounded down.
    fn charge(&self, byte_count: u64) -> Option<i64> {
        let owed = u128::from(byte_count) * u128::from(self.satoshis);
        let owed = owed.checked_div(u128::from(self.bytes))?;
        Some(i64::try_from(owed).unwrap_or(i64::MAX))
    }
}

/// One row of a fee schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub fee_type: FeeType,
    pub mining_fee: FeeUnit,
    /// Fee for retaining the transaction in the secondary mempool
    pub relay_fee: FeeUnit,
}

/// Ordered fee rate table loaded for one profile
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(transparent)]
pub struct FeeSchedule(pub Vec<Fee>);

/// Fees required for mining and for relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiredFees {
    pub mining: i64,
    pub relay: i64,
}

impl FeeSchedule {
    /// Build a schedule, rejecting zero-byte rate units.
    pub fn new(fees: Vec<Fee>) -> Result<Self, ConfigError> {
        let schedule = Self(fees);
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, fee) in self.0.iter().enumerate() {
            if fee.mining_fee.bytes == 0 || fee.relay_fee.bytes == 0 {
                return Err(ConfigError::FeeSchedule(format!(
                    "entry {} ({:?}) has a zero byte unit",
                    idx, fee.fee_type
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn fees(&self) -> &[Fee] {
        &self.0
    }

    /// Sum the charges of every entry against the byte counts of its type.
    pub fn required_fees(
        &self,
        standard_bytes: u64,
        data_bytes: u64,
    ) -> Result<RequiredFees, ConfigError> {
        let mut required = RequiredFees::default();
        for fee in &self.0 {
            let byte_count = match fee.fee_type {
                FeeType::Standard => standard_bytes,
                FeeType::Data => data_bytes,
            };
            let zero_unit = || ConfigError::FeeSchedule("zero byte unit".to_string());
            required.mining = required
                .mining
                .saturating_add(fee.mining_fee.charge(byte_count).ok_or_else(zero_unit)?);
            required.relay = required
                .relay
                .saturating_add(fee.relay_fee.charge(byte_count).ok_or_else(zero_unit)?);
        }
        Ok(required)
    }
}

/// Result of evaluating a transaction against a fee schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeDecision {
    /// Implicit fee (inputs minus outputs); negative for overspending transactions
    pub fee_amount: i64,
    pub ok_to_mine: bool,
    pub ok_to_relay: bool,
}

impl FeeDecision {
    #[must_use]
    pub fn new(fee_amount: i64, required: RequiredFees) -> Self {
        Self {
            fee_amount,
            ok_to_mine: fee_amount >= required.mining,
            ok_to_relay: fee_amount >= required.relay,
        }
    }

    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        self.ok_to_mine || self.ok_to_relay
    }
}

/// Terminal state of a transaction submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Rejected(String),
    Accepted(String),
    ServiceUnavailable,
    AmbiguousUpstream,
}

// ============================================================================
// API PAYLOADS
// ============================================================================

/// Outcome flag used by every merchant API payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReturnResult {
    Success,
    Failure,
}

/// Body of `POST /mapi/tx` when sent as JSON
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitTransactionRequest {
    /// Raw transaction hex
    #[validate(length(min = 1, message = "Transaction hex must be provided"))]
    #[schema(example = "0100000001...")]
    pub rawtx: String,
}

/// Signed fee quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub api_version: String,
    pub timestamp: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    /// Null when the gateway has no miner key
    pub miner_id: Option<String>,
    pub current_highest_block_hash: String,
    pub current_highest_block_height: u32,
    pub miner_reputation: Option<String>,
    pub fees: Vec<Fee>,
}

/// Response to a transaction submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub api_version: String,
    pub timestamp: DateTime<Utc>,
    pub txid: String,
    pub return_result: ReturnResult,
    pub result_description: String,
    pub miner_id: Option<String>,
    pub current_highest_block_hash: String,
    pub current_highest_block_height: u32,
    /// Minutes the transaction is kept in the secondary mempool
    pub tx_second_mempool_expiry: u16,
}

/// Response to a single transaction status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub api_version: String,
    pub timestamp: DateTime<Utc>,
    pub return_result: ReturnResult,
    pub result_description: String,
    pub block_hash: Option<String>,
    pub block_height: Option<u32>,
    pub confirmations: u32,
    pub miner_id: Option<String>,
    pub tx_second_mempool_expiry: u16,
}

/// Per-transaction row of a batch status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TxQueryData {
    pub txid: String,
    pub return_result: ReturnResult,
    pub result_description: String,
    pub block_hash: Option<String>,
    pub block_height: Option<u32>,
    pub confirmations: u32,
}

/// Response to a batch status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiTransactionStatusResponse {
    pub api_version: String,
    pub timestamp: DateTime<Utc>,
    pub miner_id: Option<String>,
    pub txs: Vec<TxQueryData>,
    pub failure_count: u32,
}

/// Signed wrapper around every successful payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JsonEnvelope {
    /// Payload serialized as JSON text
    pub payload: String,
    pub signature: Option<String>,
    pub public_key: Option<String>,
    pub encoding: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = 503)]
    pub status: u16,
    #[schema(example = 21)]
    pub code: u16,
    #[schema(example = "No results from bitcoin multiplexer")]
    pub error: String,
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every node answered
    Healthy,
    /// Some nodes answered
    Degraded,
    /// No node answered
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Nodes configured in the pool
    pub nodes_total: usize,
    /// Nodes that answered `getblockchaininfo`
    pub nodes_responding: usize,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(nodes_total: usize, nodes_responding: usize) -> Self {
        let status = match nodes_responding {
            0 => HealthStatus::Unhealthy,
            n if n >= nodes_total => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            nodes_total,
            nodes_responding,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
