//! Raw transaction parsing and output classification.

use bitcoin::Transaction;
use bitcoin::consensus::encode;

use super::error::TransactionError;

pub const OP_FALSE: u8 = 0x00;
pub const OP_RETURN: u8 = 0x6a;

/// Reference to the output an input spends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousOutput {
    /// Parent transaction id in RPC (display) byte order
    pub txid: String,
    pub vout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOutput {
    /// Zero-value output whose script opens with `OP_RETURN` or `OP_FALSE OP_RETURN`.
    #[must_use]
    pub fn is_data(&self) -> bool {
        self.value == 0
            && matches!(
                self.script.as_slice(),
                [OP_RETURN, ..] | [OP_FALSE, OP_RETURN, ..]
            )
    }
}

/// Transaction reduced to what the fee policy needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub inputs: Vec<PreviousOutput>,
    pub outputs: Vec<TxOutput>,
    /// Serialized size in bytes
    pub total_bytes: u64,
}

impl ParsedTransaction {
    pub fn from_hex(raw_hex: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(raw_hex.trim())
            .map_err(|e| TransactionError::Parse(format!("invalid hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        if bytes.is_empty() {
            return Err(TransactionError::Parse("empty transaction".to_string()));
        }

        let tx: Transaction =
            encode::deserialize(bytes).map_err(|e| TransactionError::Parse(e.to_string()))?;

        let inputs = tx
            .input
            .iter()
            .map(|txin| PreviousOutput {
                txid: txin.previous_output.txid.to_string(),
                vout: txin.previous_output.vout,
            })
            .collect();

        let outputs = tx
            .output
            .iter()
            .map(|txout| TxOutput {
                value: txout.value.to_sat(),
                script: txout.script_pubkey.as_bytes().to_vec(),
            })
            .collect();

        Ok(Self {
            inputs,
            outputs,
            total_bytes: bytes.len() as u64,
        })
    }

    #[must_use]
    pub fn output_value(&self, vout: u32) -> Option<u64> {
        self.outputs.get(vout as usize).map(|out| out.value)
    }

    #[must_use]
    pub fn total_output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, out| acc.saturating_add(out.value))
    }

    /// Script bytes of data-carrying outputs
    #[must_use]
    pub fn data_bytes(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|out| out.is_data())
            .map(|out| out.script.len() as u64)
            .sum()
    }

    /// Every byte that is not data-carrying script
    #[must_use]
    pub fn standard_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.data_bytes())
    }
}
