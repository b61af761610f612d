//! Fee policy: how much a transaction pays versus what the schedule requires.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::domain::{
    AppError, ConfigError, FeeDecision, FeeSchedule, Invocation, ParsedTransaction, PreviousOutput,
    TransactionError, UpstreamError,
};

use super::multiplexer::Multiplexer;

/// How much agreement is required before trusting a parent transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrevTxPolicy {
    /// Use whichever distinct payload arrived first
    #[default]
    FirstResponse,
    /// Fail unless every responding node returned the same payload
    RequireAgreement,
}

impl FromStr for PrevTxPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_response" | "first" => Ok(Self::FirstResponse),
            "require_agreement" | "agreement" => Ok(Self::RequireAgreement),
            other => Err(ConfigError::Invalid {
                key: "PREV_TX_POLICY".to_string(),
                message: format!("unknown policy '{}'", other),
            }),
        }
    }
}

impl fmt::Display for PrevTxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstResponse => write!(f, "first_response"),
            Self::RequireAgreement => write!(f, "require_agreement"),
        }
    }
}

impl PrevTxPolicy {
    /// Policy from `PREV_TX_POLICY`; unset means [`PrevTxPolicy::FirstResponse`].
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("PREV_TX_POLICY") {
            Ok(v) if !v.is_empty() => v.parse(),
            _ => Ok(Self::default()),
        }
    }
}

/// Evaluates raw transactions against a fee schedule
#[derive(Clone)]
pub struct FeePolicyEngine {
    multiplexer: Arc<Multiplexer>,
    policy: PrevTxPolicy,
}

impl FeePolicyEngine {
    #[must_use]
    pub fn new(multiplexer: Arc<Multiplexer>, policy: PrevTxPolicy) -> Self {
        Self {
            multiplexer,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> PrevTxPolicy {
        self.policy
    }

    /// Compute the implicit fee of `raw_hex` and whether it satisfies `schedule`.
    ///
    /// Every input's parent is fetched through the multiplexer; any input that
    /// can't be resolved fails the whole evaluation.
    #[instrument(skip(self, raw_hex, schedule), fields(policy = %self.policy))]
    pub async fn evaluate(
        &self,
        raw_hex: &str,
        schedule: &FeeSchedule,
    ) -> Result<FeeDecision, AppError> {
        let tx = ParsedTransaction::from_hex(raw_hex)?;

        let mut fee_amount: i64 = 0;
        for input in &tx.inputs {
            let value = self.input_value(input).await?;
            fee_amount = fee_amount.saturating_add(to_i64(value));
        }
        fee_amount = fee_amount.saturating_sub(to_i64(tx.total_output_value()));

        let standard_bytes = tx.standard_bytes();
        let data_bytes = tx.data_bytes();
        let required = schedule.required_fees(standard_bytes, data_bytes)?;
        let decision = FeeDecision::new(fee_amount, required);

        debug!(
            fee_amount,
            standard_bytes,
            data_bytes,
            mining_required = required.mining,
            relay_required = required.relay,
            ok_to_mine = decision.ok_to_mine,
            ok_to_relay = decision.ok_to_relay,
            "Evaluated transaction fees"
        );

        Ok(decision)
    }

    /// Value of the output an input spends, read from its parent transaction.
    async fn input_value(&self, input: &PreviousOutput) -> Result<u64, AppError> {
        let responses = self
            .multiplexer
            .invoke(&Invocation::raw_transaction(&input.txid, false), false, true)
            .await;

        if responses.len() > 1 {
            match self.policy {
                PrevTxPolicy::FirstResponse => warn!(
                    txid = %input.txid,
                    distinct = responses.len(),
                    "Nodes disagree on parent transaction, using first response"
                ),
                PrevTxPolicy::RequireAgreement => {
                    warn!(txid = %input.txid, distinct = responses.len(), "Nodes disagree on parent transaction");
                    return Err(UpstreamError::Mixed.into());
                }
            }
        }

        let entry = responses
            .first()
            .ok_or_else(|| TransactionError::PreviousTxNotFound(input.txid.clone()))?;

        // a garbled parent is the node's fault, not the submitter's
        let parent = serde_json::from_str::<String>(entry)
            .map_err(|e| e.to_string())
            .and_then(|hex| ParsedTransaction::from_hex(&hex).map_err(|e| e.to_string()))
            .map_err(|e| UpstreamError::Rpc(format!("parent {}: {}", input.txid, e)))?;

        parent.output_value(input.vout).ok_or_else(|| {
            TransactionError::PreviousTxNotFound(format!("{}:{}", input.txid, input.vout)).into()
        })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
