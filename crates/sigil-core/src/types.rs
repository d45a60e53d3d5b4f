//! UTXO and indexer lookup types.
//!
//! These are the values exchanged with external collaborators. They are
//! transient: fetched fresh for every operation and never mutated in place.

use std::fmt;

use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};

/// An unspent output paying the wallet's address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Utxo {
    /// Transaction that created the output.
    pub txid: Txid,
    /// Output index within that transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    /// Whether the creating transaction is mined.
    pub confirmed: bool,
}

impl Utxo {
    /// The outpoint this UTXO spends from.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    /// Sum of values, `None` on overflow.
    pub fn total_value(utxos: &[Utxo]) -> Option<u64> {
        utxos
            .iter()
            .try_fold(0u64, |acc, utxo| acc.checked_add(utxo.value))
    }
}

impl fmt::Display for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({} sats)", self.txid, self.vout, self.value)
    }
}

/// Confirmed and mempool balance of an address.
///
/// Each figure is funded minus spent within its pool, so the mempool part can
/// be negative while a spend is unconfirmed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressBalance {
    pub confirmed_sats: i64,
    pub unconfirmed_sats: i64,
}

impl AddressBalance {
    /// Confirmed plus unconfirmed.
    pub fn total(&self) -> i64 {
        self.confirmed_sats.saturating_add(self.unconfirmed_sats)
    }
}

/// Block inclusion status as reported by the indexer.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TxStatus {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_hash: Option<String>,
    pub block_time: Option<u64>,
}

/// One input of an indexed transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxInputDetail {
    pub txid: Txid,
    pub vout: u32,
    /// Witness stack items, hex-encoded.
    pub witness: Option<Vec<String>>,
    pub is_coinbase: bool,
    pub sequence: u32,
    /// Value of the output being spent, when the indexer knows it.
    pub prevout_value: Option<u64>,
}

/// One output of an indexed transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOutputDetail {
    pub value: u64,
    /// Locking script, hex-encoded.
    pub script_pubkey: String,
    pub address: Option<String>,
}

/// Indexer view of a single transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxDetail {
    pub txid: Txid,
    pub status: TxStatus,
    pub fee: Option<u64>,
    pub size: Option<u64>,
    pub weight: Option<u64>,
    pub vin: Vec<TxInputDetail>,
    pub vout: Vec<TxOutputDetail>,
}

impl TxDetail {
    /// Per-input witness metadata for [`parse_transaction`](crate::parser::parse_transaction).
    pub fn witness_metadata(&self) -> WitnessMetadata {
        self.vin
            .iter()
            .map(|input| InputMetadata {
                witness: input.witness.clone(),
                confirmed: Some(self.status.confirmed),
            })
            .collect()
    }
}

/// Entry of an address history listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxSummary {
    pub txid: Txid,
    pub status: TxStatus,
    pub fee: Option<u64>,
    pub size: Option<u64>,
    pub weight: Option<u64>,
    /// Sum of all output values in satoshis.
    pub total_output_value: u64,
}

/// Out-of-band data about one input, supplied by an indexer.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct InputMetadata {
    /// Witness stack items, hex-encoded.
    pub witness: Option<Vec<String>>,
    pub confirmed: Option<bool>,
}

/// Ordered per-input metadata. May be empty or shorter than the input list.
pub type WitnessMetadata = Vec<InputMetadata>;
