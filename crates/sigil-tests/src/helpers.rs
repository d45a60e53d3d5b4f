//! Shared test helpers for E2E and adversarial tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    ecdsa, Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use parking_lot::Mutex;

use sigil_core::constants::DUST_LIMIT;
use sigil_core::error::ProviderError;
use sigil_core::traits::{Broadcaster, UtxoSource};
use sigil_core::types::{
    AddressBalance, TxDetail, TxInputDetail, TxOutputDetail, TxStatus, TxSummary, Utxo,
};
use sigil_wallet::{EngineConfig, Wallet, WalletEngine};

/// BIP-39 test phrase; derives `tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl` on testnet.
pub const ABANDON: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// BIP-173 testnet P2WPKH vector, owned by nobody in these tests.
pub const FOREIGN_ADDRESS: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

/// The wallet restored from [`ABANDON`].
pub fn abandon_wallet() -> Wallet {
    Wallet::import("alice", ABANDON, Network::Testnet).unwrap()
}

/// A freshly generated wallet for `user`.
pub fn fresh_wallet(user: &str) -> Wallet {
    Wallet::generate(user, Network::Testnet).unwrap()
}

/// An engine over `chain` with default settings.
pub fn engine(chain: &Arc<MockChain>) -> WalletEngine {
    engine_with(chain, EngineConfig::default())
}

pub fn engine_with(chain: &Arc<MockChain>, config: EngineConfig) -> WalletEngine {
    WalletEngine::new(chain.clone(), chain.clone(), config)
}

/// Verify the witness of P2WPKH input `index` against `prevout`.
///
/// Checks that the witness is `[signature, pubkey]`, that the pubkey hashes
/// to the prevout's program, and that the signature is valid for the
/// BIP-143 digest.
pub fn verify_p2wpkh_input(tx: &Transaction, index: usize, prevout: &TxOut) -> Result<(), String> {
    let input = tx.input.get(index).ok_or("input out of range")?;
    let witness = &input.witness;
    if witness.len() != 2 {
        return Err(format!("witness has {} items, expected 2", witness.len()));
    }
    let sig_bytes = witness.nth(0).ok_or("missing signature")?;
    let key_bytes = witness.nth(1).ok_or("missing pubkey")?;
    let sig = ecdsa::Signature::from_slice(sig_bytes).map_err(|e| e.to_string())?;
    let pubkey = CompressedPublicKey::from_slice(key_bytes).map_err(|e| e.to_string())?;

    if ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()) != prevout.script_pubkey {
        return Err("pubkey does not match witness program".into());
    }

    let sighash = SighashCache::new(tx)
        .p2wpkh_signature_hash(index, &prevout.script_pubkey, prevout.value, sig.sighash_type)
        .map_err(|e| e.to_string())?;
    let msg = Message::from_digest(sighash.to_byte_array());
    Secp256k1::verification_only()
        .verify_ecdsa(&msg, &sig.signature, &pubkey.0)
        .map_err(|e| e.to_string())
}

#[derive(Clone)]
struct Coin {
    output: TxOut,
    address: String,
}

#[derive(Default)]
struct ChainInner {
    utxos: HashMap<OutPoint, Coin>,
    spent: HashMap<OutPoint, TxOut>,
    txs: HashMap<Txid, Transaction>,
    confirmed: HashSet<Txid>,
    /// Txids in insertion order.
    order: Vec<Txid>,
    broadcasts: Vec<String>,
    funding_nonce: u32,
}

/// In-memory chain acting as both UTXO source and relay.
///
/// Broadcasts are validated like a relaying node would: inputs must be
/// unspent, every witness must verify, outputs may not exceed inputs, no
/// output may be dust and the fee must be at least 1 sat/vB. Accepted
/// transactions are applied to the UTXO set unconfirmed.
pub struct MockChain {
    network: Network,
    inner: Mutex<ChainInner>,
    delay: Mutex<Option<Duration>>,
    reject_next: Mutex<Option<String>>,
    utxo_fetches: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            network: Network::Testnet,
            inner: Mutex::new(ChainInner::default()),
            delay: Mutex::new(None),
            reject_next: Mutex::new(None),
            utxo_fetches: AtomicUsize::new(0),
        })
    }

    /// Create a confirmed output of `value` paying `address`.
    pub fn fund(&self, address: &Address, value: u64) -> OutPoint {
        let mut inner = self.inner.lock();
        inner.funding_nonce += 1;
        let mut nonce = [0u8; 32];
        nonce[..4].copy_from_slice(&inner.funding_nonce.to_le_bytes());
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array(nonce), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value),
                script_pubkey: address.script_pubkey(),
            }],
        };
        let txid = tx.compute_txid();
        let outpoint = OutPoint::new(txid, 0);
        inner.utxos.insert(
            outpoint,
            Coin {
                output: tx.output[0].clone(),
                address: address.to_string(),
            },
        );
        inner.confirmed.insert(txid);
        inner.order.push(txid);
        inner.txs.insert(txid, tx);
        outpoint
    }

    /// Mark every known transaction confirmed.
    pub fn confirm_all(&self) {
        let mut inner = self.inner.lock();
        let txids: Vec<Txid> = inner.txs.keys().copied().collect();
        inner.confirmed.extend(txids);
    }

    /// Delay every subsequent collaborator call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Reject the next broadcast with `reason`.
    pub fn reject_next(&self, reason: &str) {
        *self.reject_next.lock() = Some(reason.to_string());
    }

    /// Raw hex of every accepted broadcast, in order.
    pub fn broadcasts(&self) -> Vec<String> {
        self.inner.lock().broadcasts.clone()
    }

    pub fn utxo_fetches(&self) -> usize {
        self.utxo_fetches.load(Ordering::SeqCst)
    }

    pub fn transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.inner.lock().txs.get(txid).cloned()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn validate_and_apply(&self, tx: Transaction, raw_hex: &str) -> Result<Txid, String> {
        let mut inner = self.inner.lock();

        let mut prevouts = Vec::with_capacity(tx.input.len());
        for input in &tx.input {
            let coin = inner
                .utxos
                .get(&input.previous_output)
                .ok_or("bad-txns-inputs-missingorspent")?;
            prevouts.push(coin.output.clone());
        }
        for (i, prevout) in prevouts.iter().enumerate() {
            verify_p2wpkh_input(&tx, i, prevout)
                .map_err(|e| format!("mandatory-script-verify-flag-failed ({e})"))?;
        }

        let input_value: u64 = prevouts.iter().map(|p| p.value.to_sat()).sum();
        let output_value: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
        if output_value > input_value {
            return Err("bad-txns-in-belowout".into());
        }
        if tx
            .output
            .iter()
            .any(|o| o.value.to_sat() < DUST_LIMIT && !o.script_pubkey.is_op_return())
        {
            return Err("dust".into());
        }
        if input_value - output_value < tx.vsize() as u64 {
            return Err("min relay fee not met".into());
        }

        let txid = tx.compute_txid();
        for (input, prevout) in tx.input.iter().zip(prevouts) {
            inner.utxos.remove(&input.previous_output);
            inner.spent.insert(input.previous_output, prevout);
        }
        for (vout, output) in tx.output.iter().enumerate() {
            if let Ok(address) = Address::from_script(&output.script_pubkey, self.network) {
                inner.utxos.insert(
                    OutPoint::new(txid, vout as u32),
                    Coin {
                        output: output.clone(),
                        address: address.to_string(),
                    },
                );
            }
        }
        inner.order.push(txid);
        inner.txs.insert(txid, tx);
        inner.broadcasts.push(raw_hex.to_string());
        Ok(txid)
    }

    fn status(inner: &ChainInner, txid: &Txid) -> TxStatus {
        let confirmed = inner.confirmed.contains(txid);
        TxStatus {
            confirmed,
            block_height: confirmed.then_some(100),
            block_hash: None,
            block_time: None,
        }
    }

    fn touches(&self, inner: &ChainInner, tx: &Transaction, address: &str) -> bool {
        let pays = tx.output.iter().any(|o| {
            Address::from_script(&o.script_pubkey, self.network)
                .map(|a| a.to_string() == address)
                .unwrap_or(false)
        });
        let spends = tx.input.iter().any(|i| {
            inner
                .spent
                .get(&i.previous_output)
                .and_then(|p| Address::from_script(&p.script_pubkey, self.network).ok())
                .map(|a| a.to_string() == address)
                .unwrap_or(false)
        });
        pays || spends
    }
}

#[async_trait]
impl UtxoSource for MockChain {
    async fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        self.utxo_fetches.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let inner = self.inner.lock();
        let mut utxos: Vec<Utxo> = inner
            .utxos
            .iter()
            .filter(|(_, coin)| coin.address == address)
            .map(|(outpoint, coin)| Utxo {
                txid: outpoint.txid,
                vout: outpoint.vout,
                value: coin.output.value.to_sat(),
                confirmed: inner.confirmed.contains(&outpoint.txid),
            })
            .collect();
        utxos.sort_by_key(|u| (u.txid, u.vout));
        Ok(utxos)
    }

    async fn fetch_raw_tx_hex(&self, txid: &Txid) -> Result<String, ProviderError> {
        self.pause().await;
        self.inner
            .lock()
            .txs
            .get(txid)
            .map(serialize_hex)
            .ok_or_else(|| ProviderError::NotFound(format!("tx/{txid}/hex")))
    }

    async fn fetch_tx_detail(&self, txid: &Txid) -> Result<TxDetail, ProviderError> {
        self.pause().await;
        let inner = self.inner.lock();
        let tx = inner
            .txs
            .get(txid)
            .ok_or_else(|| ProviderError::NotFound(format!("tx/{txid}")))?;
        let input_value: u64 = tx
            .input
            .iter()
            .filter_map(|i| inner.spent.get(&i.previous_output))
            .map(|p| p.value.to_sat())
            .sum();
        let output_value: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
        Ok(TxDetail {
            txid: *txid,
            status: Self::status(&inner, txid),
            fee: Some(input_value.saturating_sub(output_value)),
            size: Some(tx.total_size() as u64),
            weight: Some(tx.weight().to_wu()),
            vin: tx
                .input
                .iter()
                .map(|i| TxInputDetail {
                    txid: i.previous_output.txid,
                    vout: i.previous_output.vout,
                    witness: (!i.witness.is_empty())
                        .then(|| i.witness.iter().map(hex::encode).collect()),
                    is_coinbase: false,
                    sequence: i.sequence.0,
                    prevout_value: inner.spent.get(&i.previous_output).map(|p| p.value.to_sat()),
                })
                .collect(),
            vout: tx
                .output
                .iter()
                .map(|o| TxOutputDetail {
                    value: o.value.to_sat(),
                    script_pubkey: hex::encode(o.script_pubkey.as_bytes()),
                    address: Address::from_script(&o.script_pubkey, self.network)
                        .ok()
                        .map(|a| a.to_string()),
                })
                .collect(),
        })
    }

    async fn fetch_address_balance(&self, address: &str) -> Result<AddressBalance, ProviderError> {
        self.pause().await;
        let inner = self.inner.lock();
        let mut balance = AddressBalance::default();
        for (outpoint, coin) in inner.utxos.iter().filter(|(_, c)| c.address == address) {
            let value = coin.output.value.to_sat() as i64;
            if inner.confirmed.contains(&outpoint.txid) {
                balance.confirmed_sats += value;
            } else {
                balance.unconfirmed_sats += value;
            }
        }
        Ok(balance)
    }

    async fn fetch_address_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TxSummary>, ProviderError> {
        self.pause().await;
        let inner = self.inner.lock();
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|txid| inner.txs.get(txid).map(|tx| (txid, tx)))
            .filter(|(_, tx)| self.touches(&inner, tx, address))
            .take(limit)
            .map(|(txid, tx)| TxSummary {
                txid: *txid,
                status: Self::status(&inner, txid),
                fee: None,
                size: Some(tx.total_size() as u64),
                weight: Some(tx.weight().to_wu()),
                total_output_value: tx.output.iter().map(|o| o.value.to_sat()).sum(),
            })
            .collect())
    }
}

#[async_trait]
impl Broadcaster for MockChain {
    async fn broadcast(&self, raw_hex: &str) -> Result<Txid, ProviderError> {
        self.pause().await;
        if let Some(reason) = self.reject_next.lock().take() {
            return Err(ProviderError::Rejected(reason));
        }
        let bytes = hex::decode(raw_hex).map_err(|e| ProviderError::Rejected(format!("TX decode failed: {e}")))?;
        let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
            .map_err(|e| ProviderError::Rejected(format!("TX decode failed: {e}")))?;
        self.validate_and_apply(tx, raw_hex).map_err(ProviderError::Rejected)
    }
}
