//! Esplora JSON bodies and their conversion into core types.
//!
//! Field names follow the Esplora REST API as served by mempool.space and
//! Blockstream. Unknown fields are ignored.

use bitcoin::Txid;
use serde::Deserialize;

use sigil_core::error::ProviderError;
use sigil_core::types::{
    AddressBalance, TxDetail, TxInputDetail, TxOutputDetail, TxStatus, TxSummary, Utxo,
};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EsploraStatus {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_hash: Option<String>,
    pub block_time: Option<u64>,
}

impl From<EsploraStatus> for TxStatus {
    fn from(s: EsploraStatus) -> Self {
        TxStatus {
            confirmed: s.confirmed,
            block_height: s.block_height,
            block_hash: s.block_hash,
            block_time: s.block_time,
        }
    }
}

/// Entry of `GET /address/{address}/utxo`.
#[derive(Deserialize, Debug, Clone)]
pub struct EsploraUtxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: EsploraStatus,
}

impl From<EsploraUtxo> for Utxo {
    fn from(u: EsploraUtxo) -> Self {
        Utxo {
            txid: u.txid,
            vout: u.vout,
            value: u.value,
            confirmed: u.status.confirmed,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct EsploraPrevout {
    pub value: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EsploraVin {
    pub txid: Txid,
    pub vout: u32,
    pub prevout: Option<EsploraPrevout>,
    pub witness: Option<Vec<String>>,
    #[serde(default)]
    pub is_coinbase: bool,
    pub sequence: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EsploraVout {
    pub scriptpubkey: String,
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

/// Body of `GET /tx/{txid}` and entries of `GET /address/{address}/txs`.
#[derive(Deserialize, Debug, Clone)]
pub struct EsploraTx {
    pub txid: Txid,
    pub vin: Vec<EsploraVin>,
    pub vout: Vec<EsploraVout>,
    pub size: Option<u64>,
    pub weight: Option<u64>,
    pub fee: Option<u64>,
    #[serde(default)]
    pub status: EsploraStatus,
}

impl EsploraTx {
    /// Sum of output values, `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.vout
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    pub fn into_summary(self) -> Result<TxSummary, ProviderError> {
        let total_output_value = self.total_output_value().ok_or_else(|| {
            ProviderError::MalformedResponse(format!("tx {}: output values overflow", self.txid))
        })?;
        Ok(TxSummary {
            txid: self.txid,
            total_output_value,
            status: self.status.into(),
            fee: self.fee,
            size: self.size,
            weight: self.weight,
        })
    }
}

impl From<EsploraTx> for TxDetail {
    fn from(tx: EsploraTx) -> Self {
        TxDetail {
            txid: tx.txid,
            status: tx.status.into(),
            fee: tx.fee,
            size: tx.size,
            weight: tx.weight,
            vin: tx
                .vin
                .into_iter()
                .map(|i| TxInputDetail {
                    txid: i.txid,
                    vout: i.vout,
                    witness: i.witness,
                    is_coinbase: i.is_coinbase,
                    sequence: i.sequence,
                    prevout_value: i.prevout.map(|p| p.value),
                })
                .collect(),
            vout: tx
                .vout
                .into_iter()
                .map(|o| TxOutputDetail {
                    value: o.value,
                    script_pubkey: o.scriptpubkey,
                    address: o.scriptpubkey_address,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EsploraStats {
    pub funded_txo_sum: u64,
    pub spent_txo_sum: u64,
}

impl EsploraStats {
    /// Funded minus spent.
    pub fn net(&self) -> i64 {
        let funded = i64::try_from(self.funded_txo_sum).unwrap_or(i64::MAX);
        let spent = i64::try_from(self.spent_txo_sum).unwrap_or(i64::MAX);
        funded.saturating_sub(spent)
    }
}

/// Body of `GET /address/{address}`.
#[derive(Deserialize, Debug, Clone)]
pub struct EsploraAddress {
    #[serde(default)]
    pub chain_stats: EsploraStats,
    #[serde(default)]
    pub mempool_stats: EsploraStats,
}

impl From<EsploraAddress> for AddressBalance {
    fn from(a: EsploraAddress) -> Self {
        AddressBalance {
            confirmed_sats: a.chain_stats.net(),
            unconfirmed_sats: a.mempool_stats.net(),
        }
    }
}
