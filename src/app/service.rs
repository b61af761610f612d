//! Gateway service: fee quotes, submissions and status queries.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use crate::domain::{
    API_VERSION, AppError, BlockInfo, ConfigError, ERROR_PREFIX, FeeQuote, FeeScheduleProvider,
    HealthResponse, Invocation, MultiTransactionStatusResponse, RawTransactionInfo,
    ReconciledOutcome, ReturnResult, SubmissionOutcome, TransactionError, TransactionResponse,
    TransactionStatus, TxQueryData, ValidationError,
};

use super::block_info::BlockInfoResolver;
use super::fee_policy::{FeePolicyEngine, PrevTxPolicy};
use super::multiplexer::Multiplexer;
use super::reconcile::reconcile;

pub const NO_RESULTS_DESCRIPTION: &str = "No results from bitcoin multiplexer";
pub const MIXED_RESULTS_DESCRIPTION: &str = "Mixed results";
pub const UNEXPECTED_PAYLOAD_DESCRIPTION: &str = "unexpected transaction payload";

/// Service-level settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long a fee quote stays valid
    pub quote_expiry: Duration,
    pub prev_tx_policy: PrevTxPolicy,
    /// Hex public key reported as `minerId`
    pub miner_id: Option<String>,
}

impl GatewayConfig {
    /// Read `QUOTE_EXPIRY_MINUTES` (required) and `PREV_TX_POLICY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("QUOTE_EXPIRY_MINUTES")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing("QUOTE_EXPIRY_MINUTES".to_string()))?;
        Ok(Self {
            quote_expiry: parse_quote_expiry(&raw)?,
            prev_tx_policy: PrevTxPolicy::from_env()?,
            miner_id: None,
        })
    }

    #[must_use]
    pub fn with_miner_id(mut self, miner_id: Option<String>) -> Self {
        self.miner_id = miner_id;
        self
    }
}

/// Quote lifetime in whole minutes; must be positive
fn parse_quote_expiry(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "QUOTE_EXPIRY_MINUTES".to_string(),
        message,
    };

    let minutes: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a number of minutes", raw)))?;
    if minutes <= 0 {
        return Err(invalid(format!("must be positive, got {}", minutes)));
    }
    Duration::try_minutes(minutes).ok_or_else(|| invalid(format!("{} minutes is out of range", minutes)))
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            quote_expiry: Duration::minutes(10),
            prev_tx_policy: PrevTxPolicy::default(),
            miner_id: None,
        }
    }
}

/// Composes the multiplexer, tip resolver and fee policy into merchant API operations
pub struct GatewayService {
    multiplexer: Arc<Multiplexer>,
    block_info: BlockInfoResolver,
    fee_policy: FeePolicyEngine,
    fee_schedules: Arc<dyn FeeScheduleProvider>,
    config: GatewayConfig,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        multiplexer: Arc<Multiplexer>,
        fee_schedules: Arc<dyn FeeScheduleProvider>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            block_info: BlockInfoResolver::new(Arc::clone(&multiplexer)),
            fee_policy: FeePolicyEngine::new(Arc::clone(&multiplexer), config.prev_tx_policy),
            multiplexer,
            fee_schedules,
            config,
        }
    }

    #[must_use]
    pub fn miner_id(&self) -> Option<String> {
        self.config.miner_id.clone()
    }

    /// Current fee schedule for `profile`, stamped with the chain tip and an expiry.
    #[instrument(skip(self))]
    pub async fn get_fee_quote(&self, profile: Option<&str>) -> Result<FeeQuote, AppError> {
        let schedule = self.fee_schedules.load(profile).await?;
        let tip = self.block_info.resolve_tip().await?;
        let now = Utc::now();

        Ok(FeeQuote {
            api_version: API_VERSION.to_string(),
            timestamp: now,
            expiry_time: now + self.config.quote_expiry,
            miner_id: self.miner_id(),
            current_highest_block_hash: tip.best_block_hash,
            current_highest_block_height: tip.height,
            miner_reputation: None,
            fees: schedule.0,
        })
    }

    /// Check fees and, when acceptable, broadcast the transaction to every node.
    ///
    /// Returns the terminal outcome together with the chain tip used to annotate it.
    #[instrument(skip(self, raw_hex))]
    pub async fn submit(
        &self,
        raw_hex: &str,
        profile: Option<&str>,
    ) -> Result<(SubmissionOutcome, BlockInfo), AppError> {
        let raw_hex = raw_hex.trim();
        if raw_hex.is_empty() {
            return Err(ValidationError::MissingField("rawtx".to_string()).into());
        }

        let schedule = self.fee_schedules.load(profile).await?;
        let tip = self.block_info.resolve_tip().await?;
        let decision = self.fee_policy.evaluate(raw_hex, &schedule).await?;

        if !decision.is_acceptable() {
            info!(
                fee_amount = decision.fee_amount,
                "Rejecting transaction with insufficient fees"
            );
            let reason = TransactionError::InsufficientFee.to_string();
            return Ok((SubmissionOutcome::Rejected(reason), tip));
        }

        let responses = self
            .multiplexer
            .invoke(
                &Invocation::send_raw_transaction(raw_hex, false, decision.ok_to_mine),
                true,
                true,
            )
            .await;

        let outcome = SubmissionOutcome::from(reconcile(&responses));
        match &outcome {
            SubmissionOutcome::Accepted(txid) => info!(%txid, "Transaction accepted"),
            SubmissionOutcome::Rejected(reason) => info!(%reason, "Transaction rejected by nodes"),
            SubmissionOutcome::ServiceUnavailable => warn!("No node accepted the broadcast"),
            SubmissionOutcome::AmbiguousUpstream => {
                warn!(distinct = responses.len(), "Nodes disagreed on broadcast")
            }
        }

        Ok((outcome, tip))
    }

    /// [`Self::submit`] rendered as the merchant API response.
    pub async fn submit_transaction(
        &self,
        raw_hex: &str,
        profile: Option<&str>,
    ) -> Result<TransactionResponse, AppError> {
        let (outcome, tip) = self.submit(raw_hex, profile).await?;

        let (txid, return_result, result_description) = match outcome {
            SubmissionOutcome::Accepted(txid) => (txid, ReturnResult::Success, String::new()),
            SubmissionOutcome::Rejected(reason) => (String::new(), ReturnResult::Failure, reason),
            SubmissionOutcome::ServiceUnavailable => (
                String::new(),
                ReturnResult::Failure,
                NO_RESULTS_DESCRIPTION.to_string(),
            ),
            SubmissionOutcome::AmbiguousUpstream => (
                String::new(),
                ReturnResult::Failure,
                MIXED_RESULTS_DESCRIPTION.to_string(),
            ),
        };

        Ok(TransactionResponse {
            api_version: API_VERSION.to_string(),
            timestamp: Utc::now(),
            txid,
            return_result,
            result_description,
            miner_id: self.miner_id(),
            current_highest_block_hash: tip.best_block_hash,
            current_highest_block_height: tip.height,
            tx_second_mempool_expiry: 0,
        })
    }

    #[instrument(skip(self))]
    pub async fn query_transaction_status(&self, txid: &str) -> Result<TransactionStatus, AppError> {
        if txid.trim().is_empty() {
            return Err(ValidationError::MissingField("txid".to_string()).into());
        }
        let row = self.status_row(txid).await;

        Ok(TransactionStatus {
            api_version: API_VERSION.to_string(),
            timestamp: Utc::now(),
            return_result: row.return_result,
            result_description: row.result_description,
            block_hash: row.block_hash,
            block_height: row.block_height,
            confirmations: row.confirmations,
            miner_id: self.miner_id(),
            tx_second_mempool_expiry: 0,
        })
    }

    /// Status of each txid in order, counting those that did not resolve cleanly.
    ///
    /// Every txid yields a row; a bad txid only fails its own row.
    #[instrument(skip(self, txids), fields(count = txids.len()))]
    pub async fn multi_transaction_status(
        &self,
        txids: &[String],
    ) -> Result<MultiTransactionStatusResponse, AppError> {
        if txids.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "txids".to_string(),
                message: "must send at least 1 txid".to_string(),
            }
            .into());
        }

        let mut txs = Vec::with_capacity(txids.len());
        let mut failure_count = 0u32;
        for txid in txids {
            let row = self.status_row(txid).await;
            if row.return_result == ReturnResult::Failure {
                failure_count += 1;
            }
            txs.push(row);
        }

        Ok(MultiTransactionStatusResponse {
            api_version: API_VERSION.to_string(),
            timestamp: Utc::now(),
            miner_id: self.miner_id(),
            txs,
            failure_count,
        })
    }

    /// Pool health from a `getblockchaininfo` round
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let responses = self
            .multiplexer
            .invoke(&Invocation::blockchain_info(), false, false)
            .await;
        HealthResponse::new(self.multiplexer.node_count(), responses.len())
    }

    async fn status_row(&self, txid: &str) -> TxQueryData {
        let txid = txid.trim();
        let failure = |description: String| TxQueryData {
            txid: txid.to_string(),
            return_result: ReturnResult::Failure,
            result_description: description,
            block_hash: None,
            block_height: None,
            confirmations: 0,
        };

        if txid.is_empty() {
            return failure(ValidationError::MissingField("txid".to_string()).to_string());
        }

        let responses = self
            .multiplexer
            .invoke(&Invocation::raw_transaction(txid, true), true, true)
            .await;

        match reconcile(&responses) {
            ReconciledOutcome::NoResults => failure(NO_RESULTS_DESCRIPTION.to_string()),
            ReconciledOutcome::SingleError(message) => {
                failure(format!("{}{}", ERROR_PREFIX, message))
            }
            ReconciledOutcome::Mixed => failure(MIXED_RESULTS_DESCRIPTION.to_string()),
            ReconciledOutcome::SingleSuccess(payload) => {
                match serde_json::from_str::<RawTransactionInfo>(&payload) {
                    Ok(info) => TxQueryData {
                        txid: txid.to_string(),
                        return_result: ReturnResult::Success,
                        result_description: String::new(),
                        block_hash: info.block_hash,
                        block_height: info.block_height,
                        confirmations: info.confirmations,
                    },
                    Err(e) => {
                        warn!(txid = %txid, error = %e, "Node returned an undecodable transaction");
                        failure(UNEXPECTED_PAYLOAD_DESCRIPTION.to_string())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::multiplexer::MultiplexerConfig;
    use crate::domain::{HealthStatus, NodeClient, NodeError, UpstreamError};
    use crate::infra::NodePool;
    use crate::test_utils::fixtures::{
        P2PKH_SCRIPT, blockchain_info, parent_tx, raw_tx, standard_schedule, txid, verbose_tx,
    };
    use crate::test_utils::{MockFeeScheduleProvider, MockNodeClient};
    use serde_json::{Value, json};

    fn service(nodes: Vec<Arc<MockNodeClient>>, fees: MockFeeScheduleProvider) -> GatewayService {
        let clients: Vec<Arc<dyn NodeClient>> = nodes
            .into_iter()
            .map(|n| n as Arc<dyn NodeClient>)
            .collect();
        let mux = Multiplexer::new(NodePool::new(clients), MultiplexerConfig::default());
        GatewayService::new(
            Arc::new(mux),
            Arc::new(fees),
            GatewayConfig::default().with_miner_id(Some("ab".repeat(32))),
        )
    }

    fn chain_node(addr: &str) -> MockNodeClient {
        MockNodeClient::new(addr).with_response("getblockchaininfo", blockchain_info(100, "aaa"))
    }

    fn spend(parent_id: &str, value: u64) -> String {
        raw_tx(&[(parent_id, 0)], &[(value, P2PKH_SCRIPT.to_vec())])
    }

    #[tokio::test]
    async fn test_fee_quote_uses_lowest_tip_and_expiry() {
        let nodes = vec![
            Arc::new(chain_node("a")),
            Arc::new(
                MockNodeClient::new("b")
                    .with_response("getblockchaininfo", blockchain_info(105, "bbb")),
            ),
        ];
        let fees = MockFeeScheduleProvider::new()
            .with_default(standard_schedule((500, 1000), (250, 1000)));
        let svc = service(nodes, fees);

        let quote = svc.get_fee_quote(None).await.unwrap();
        assert_eq!(quote.current_highest_block_height, 100);
        assert_eq!(quote.current_highest_block_hash, "aaa");
        assert_eq!(quote.expiry_time - quote.timestamp, Duration::minutes(10));
        assert_eq!(quote.fees.len(), 1);
        assert!(quote.miner_reputation.is_none());
        assert_eq!(quote.miner_id, Some("ab".repeat(32)));
    }

    #[tokio::test]
    async fn test_fee_quote_unknown_profile_fails() {
        let svc = service(vec![Arc::new(chain_node("a"))], MockFeeScheduleProvider::new());
        let err = svc.get_fee_quote(Some("vip")).await.unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Missing(_))));
    }

    #[tokio::test]
    async fn test_zero_fee_submission_is_rejected_without_broadcast() {
        let parent_id = txid(0x01);
        let node = Arc::new(chain_node("a").with_response_for(
            "getrawtransaction",
            &parent_id,
            Value::from(parent_tx(&[1_000])),
        ));
        let fees = MockFeeScheduleProvider::new().with_default(standard_schedule((1, 1), (1, 1)));
        let svc = service(vec![node.clone()], fees);

        let (outcome, tip) = svc.submit(&spend(&parent_id, 1_000), None).await.unwrap();
        assert_eq!(outcome, SubmissionOutcome::Rejected("Not enough fees".to_string()));
        assert_eq!(tip.height, 100);
        assert!(node.calls_for("sendrawtransaction").is_empty());
    }

    #[tokio::test]
    async fn test_submission_accepted_with_dont_check_fee() {
        let parent_id = txid(0x02);
        let raw = spend(&parent_id, 900);
        let node = Arc::new(
            chain_node("a")
                .with_response_for("getrawtransaction", &parent_id, Value::from(parent_tx(&[1_000])))
                .with_response("sendrawtransaction", Value::from(txid(0x99))),
        );
        let fees = MockFeeScheduleProvider::new().with_default(standard_schedule((0, 1), (0, 1)));
        let svc = service(vec![node.clone()], fees);

        let response = svc.submit_transaction(&raw, None).await.unwrap();
        assert_eq!(response.return_result, ReturnResult::Success);
        assert_eq!(response.txid, txid(0x99));
        assert_eq!(response.current_highest_block_height, 100);
        assert_eq!(response.tx_second_mempool_expiry, 0);
        assert_eq!(
            node.calls_for("sendrawtransaction"),
            vec![json!([raw, false, true])]
        );
    }

    #[tokio::test]
    async fn test_relay_only_submission_asks_node_to_check_fee() {
        let parent_id = txid(0x03);
        let raw = spend(&parent_id, 995);
        let node = Arc::new(
            chain_node("a")
                .with_response_for("getrawtransaction", &parent_id, Value::from(parent_tx(&[1_000])))
                .with_response("sendrawtransaction", Value::from(txid(0x98))),
        );
        // fee 5: short of 1 sat/byte mining, enough for free relay
        let fees = MockFeeScheduleProvider::new().with_default(standard_schedule((1, 1), (0, 1)));
        let svc = service(vec![node.clone()], fees);

        svc.submit_transaction(&raw, None).await.unwrap();
        assert_eq!(
            node.calls_for("sendrawtransaction"),
            vec![json!([raw, false, false])]
        );
    }

    #[tokio::test]
    async fn test_submission_node_errors_and_disagreement() {
        let parent_id = txid(0x04);
        let raw = spend(&parent_id, 900);
        let with_parent = |addr: &str| {
            chain_node(addr).with_response_for(
                "getrawtransaction",
                &parent_id,
                Value::from(parent_tx(&[1_000])),
            )
        };
        let fees = || MockFeeScheduleProvider::new().with_default(standard_schedule((0, 1), (0, 1)));

        let rejecting = Arc::new(with_parent("a").with_error(
            "sendrawtransaction",
            NodeError::Rpc {
                code: -26,
                message: "dust".to_string(),
            },
        ));
        let svc = service(vec![rejecting], fees());
        let response = svc.submit_transaction(&raw, None).await.unwrap();
        assert_eq!(response.return_result, ReturnResult::Failure);
        assert_eq!(response.result_description, "-26: dust");

        let a = Arc::new(with_parent("a").with_response("sendrawtransaction", Value::from("x1")));
        let b = Arc::new(with_parent("b").with_response("sendrawtransaction", Value::from("x2")));
        let svc = service(vec![a, b], fees());
        let (outcome, _) = svc.submit(&raw, None).await.unwrap();
        assert_eq!(outcome, SubmissionOutcome::AmbiguousUpstream);
        let response = svc.submit_transaction(&raw, None).await.unwrap();
        assert_eq!(response.result_description, "Mixed results");
    }

    #[tokio::test]
    async fn test_submission_without_tip_fails() {
        let svc = service(
            vec![Arc::new(MockNodeClient::failing("a", "down"))],
            MockFeeScheduleProvider::new().with_default(standard_schedule((1, 1), (1, 1))),
        );
        let err = svc.submit(&spend(&txid(5), 1), None).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(UpstreamError::NoResults)));
    }

    #[tokio::test]
    async fn test_empty_raw_transaction_is_invalid() {
        let fees = Arc::new(MockFeeScheduleProvider::new());
        let mux = Multiplexer::new(
            NodePool::new(vec![Arc::new(chain_node("a")) as Arc<dyn NodeClient>]),
            MultiplexerConfig::default(),
        );
        let svc = GatewayService::new(Arc::new(mux), fees.clone(), GatewayConfig::default());

        let err = svc.submit("  ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(fees.load_count(), 0);
    }

    #[test]
    fn test_quote_expiry_must_be_positive() {
        assert_eq!(parse_quote_expiry(" 15 ").unwrap(), Duration::minutes(15));
        for raw in ["0", "-5", "ten", ""] {
            let err = parse_quote_expiry(raw).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { key, .. } if key == "QUOTE_EXPIRY_MINUTES"),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_status_success_and_failures() {
        let mined = txid(0x10);
        let node = Arc::new(
            MockNodeClient::new("a")
                .with_response_for("getrawtransaction", &mined, verbose_tx(&mined, "bh", 90, 11))
                .with_error(
                    "getrawtransaction",
                    NodeError::Rpc {
                        code: -5,
                        message: "No such mempool or blockchain transaction".to_string(),
                    },
                ),
        );
        let svc = service(vec![node], MockFeeScheduleProvider::new());

        let status = svc.query_transaction_status(&mined).await.unwrap();
        assert_eq!(status.return_result, ReturnResult::Success);
        assert_eq!(status.block_hash.as_deref(), Some("bh"));
        assert_eq!(status.block_height, Some(90));
        assert_eq!(status.confirmations, 11);

        let status = svc.query_transaction_status(&txid(0x20)).await.unwrap();
        assert_eq!(status.return_result, ReturnResult::Failure);
        assert_eq!(
            status.result_description,
            "ERROR: -5: No such mempool or blockchain transaction"
        );
    }

    #[tokio::test]
    async fn test_status_with_no_nodes_answering() {
        let svc = service(Vec::new(), MockFeeScheduleProvider::new());
        let status = svc.query_transaction_status(&txid(1)).await.unwrap();
        assert_eq!(status.result_description, "No results from bitcoin multiplexer");
    }

    #[tokio::test]
    async fn test_multi_status_counts_failures() {
        let known = txid(0x30);
        let node = Arc::new(MockNodeClient::new("a").with_response_for(
            "getrawtransaction",
            &known,
            verbose_tx(&known, "bh", 5, 1),
        ));
        let svc = service(vec![node], MockFeeScheduleProvider::new());

        let ids = vec![known.clone(), txid(0x31), txid(0x32)];
        let response = svc.multi_transaction_status(&ids).await.unwrap();
        assert_eq!(response.txs.len(), 3);
        assert_eq!(response.txs[0].txid, known);
        assert_eq!(response.txs[0].return_result, ReturnResult::Success);
        assert_eq!(response.failure_count, 2);

        let err = svc.multi_transaction_status(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_multi_status_bad_rows_do_not_fail_batch() {
        let known = txid(0x40);
        let odd = txid(0x41);
        let missing = txid(0x42);
        let node = Arc::new(
            MockNodeClient::new("a")
                .with_response_for("getrawtransaction", &known, verbose_tx(&known, "bh", 7, 3))
                .with_response_for("getrawtransaction", &odd, Value::from("0100abcd"))
                .with_error_for(
                    "getrawtransaction",
                    &missing,
                    NodeError::Rpc {
                        code: -5,
                        message: "No such mempool or blockchain transaction".to_string(),
                    },
                ),
        );
        let svc = service(vec![node.clone()], MockFeeScheduleProvider::new());

        let ids = vec![known.clone(), odd.clone(), String::new(), missing.clone()];
        let response = svc.multi_transaction_status(&ids).await.unwrap();
        assert_eq!(response.txs.len(), 4);
        assert_eq!(response.failure_count, 3);

        assert_eq!(response.txs[0].return_result, ReturnResult::Success);
        assert_eq!(response.txs[0].block_height, Some(7));

        assert_eq!(response.txs[1].txid, odd);
        assert_eq!(response.txs[1].return_result, ReturnResult::Failure);
        assert_eq!(response.txs[1].result_description, UNEXPECTED_PAYLOAD_DESCRIPTION);

        assert_eq!(response.txs[2].return_result, ReturnResult::Failure);
        assert!(response.txs[2].result_description.contains("txid"));

        assert_eq!(response.txs[3].txid, missing);
        assert_eq!(
            response.txs[3].result_description,
            "ERROR: -5: No such mempool or blockchain transaction"
        );

        // the empty txid is never sent to the nodes
        assert_eq!(node.calls_for("getrawtransaction").len(), 3);
    }

    #[tokio::test]
    async fn test_single_status_rejects_empty_txid() {
        let svc = service(vec![Arc::new(MockNodeClient::new("a"))], MockFeeScheduleProvider::new());
        let err = svc.query_transaction_status(" ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::MissingField(_))));
    }

    #[tokio::test]
    async fn test_health_reflects_responding_nodes() {
        let svc = service(
            vec![Arc::new(chain_node("a")), Arc::new(MockNodeClient::failing("b", "down"))],
            MockFeeScheduleProvider::new(),
        );
        let health = svc.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.nodes_total, 2);
        assert_eq!(health.nodes_responding, 1);
    }
}
