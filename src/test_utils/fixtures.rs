//! Builders for transactions, node payloads and fee schedules.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde_json::{Value, json};

use crate::domain::{Fee, FeeSchedule, FeeType, FeeUnit};

/// Pay-to-pubkey-hash locking script with a dummy hash
pub const P2PKH_SCRIPT: [u8; 25] = [
    0x76, 0xa9, 0x14, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 0x88,
    0xac,
];

/// A 64-character txid made of one repeated byte
#[must_use]
pub fn txid(byte: u8) -> String {
    hex::encode([byte; 32])
}

/// Serialize a transaction spending `inputs` (txid, vout) into `outputs` (value, script).
///
/// # Panics
/// Panics if a txid is not 64 hex characters.
#[must_use]
pub fn raw_tx(inputs: &[(&str, u32)], outputs: &[(u64, Vec<u8>)]) -> String {
    let tx = Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|(txid, vout)| TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_str(txid).expect("valid txid"),
                    vout: *vout,
                },
                script_sig: ScriptBuf::from_bytes(vec![0x51]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs
            .iter()
            .map(|(value, script)| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: ScriptBuf::from_bytes(script.clone()),
            })
            .collect(),
    };
    bitcoin::consensus::encode::serialize_hex(&tx)
}

/// A parent transaction paying `values` to P2PKH outputs
#[must_use]
pub fn parent_tx(values: &[u64]) -> String {
    let outputs: Vec<(u64, Vec<u8>)> = values
        .iter()
        .map(|v| (*v, P2PKH_SCRIPT.to_vec()))
        .collect();
    raw_tx(&[(&txid(0xee), 0)], &outputs)
}

/// `getblockchaininfo` result
#[must_use]
pub fn blockchain_info(height: u32, hash: &str) -> Value {
    json!({
        "chain": "main",
        "blocks": height,
        "headers": height,
        "bestblockhash": hash,
    })
}

/// Verbose `getrawtransaction` result for a mined transaction
#[must_use]
pub fn verbose_tx(txid: &str, block_hash: &str, block_height: u32, confirmations: u32) -> Value {
    json!({
        "txid": txid,
        "blockhash": block_hash,
        "blockheight": block_height,
        "confirmations": confirmations,
    })
}

/// Schedule with a single standard-bytes entry
#[must_use]
pub fn standard_schedule(mining: (u64, u64), relay: (u64, u64)) -> FeeSchedule {
    FeeSchedule(vec![Fee {
        fee_type: FeeType::Standard,
        mining_fee: FeeUnit::new(mining.0, mining.1),
        relay_fee: FeeUnit::new(relay.0, relay.1),
    }])
}

/// Schedule with standard and data entries sharing the same rates
#[must_use]
pub fn full_schedule(mining: (u64, u64), relay: (u64, u64)) -> FeeSchedule {
    let mut schedule = standard_schedule(mining, relay);
    schedule.0.push(Fee {
        fee_type: FeeType::Data,
        mining_fee: FeeUnit::new(mining.0, mining.1),
        relay_fee: FeeUnit::new(relay.0, relay.1),
    });
    schedule
}
