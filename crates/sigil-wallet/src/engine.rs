//! Send and inspection orchestration.
//!
//! [`WalletEngine`] wires key material, coin selection, building and signing
//! to the injected [`UtxoSource`] and [`Broadcaster`]. Each call to an
//! external collaborator is bounded by [`EngineConfig::io_timeout`].
//!
//! Sending runs estimate → build → sign → measure. The size model is an
//! estimate, so once the transaction is signed its real virtual size is
//! priced again; if the fee falls short the transaction is rebuilt from the
//! same UTXO snapshot with the higher fee.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::{Address, Network, Txid};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sigil_core::constants::{DEFAULT_IO_TIMEOUT_SECS, MAX_FEE_ROUNDS};
use sigil_core::error::ProviderError;
use sigil_core::parser::{parse_transaction, ParsedTransaction};
use sigil_core::traits::{Broadcaster, UtxoSource};
use sigil_core::types::{AddressBalance, TxSummary, Utxo};

use crate::builder::TransactionBuilder;
use crate::coin_selection::{CoinSelection, CoinSelector, FeePolicy, SendAmount};
use crate::error::WalletError;
use crate::signer::{sign_all, SignedTransaction};
use crate::wallet::Wallet;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Network recipients must belong to.
    pub network: Network,
    pub fee_policy: FeePolicy,
    /// Bound on each external call.
    pub io_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            fee_policy: FeePolicy::default(),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
        }
    }
}

/// Outcome of a successful broadcast.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Txid as reported by the broadcaster.
    pub txid: Txid,
    pub raw_hex: String,
    pub sent_amount: u64,
    pub fee: u64,
    pub vsize: u64,
    /// Change returned to the wallet, zero when there is no change output.
    pub change: u64,
}

/// A signed transaction with the selection it was built from.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub signed: SignedTransaction,
    pub selection: CoinSelection,
}

pub struct WalletEngine {
    source: Arc<dyn UtxoSource>,
    broadcaster: Arc<dyn Broadcaster>,
    config: EngineConfig,
}

impl WalletEngine {
    pub fn new(
        source: Arc<dyn UtxoSource>,
        broadcaster: Arc<dyn Broadcaster>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            broadcaster,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse `recipient` and check it belongs to the configured network.
    pub fn parse_recipient(&self, recipient: &str) -> Result<Address, WalletError> {
        Address::from_str(recipient.trim())
            .map_err(|e| WalletError::InvalidRecipientAddress(format!("{recipient}: {e}")))?
            .require_network(self.config.network)
            .map_err(|e| WalletError::InvalidRecipientAddress(format!("{recipient}: {e}")))
    }

    /// Select, build and sign a payment without broadcasting it.
    ///
    /// The recipient and explicit amount are validated before any UTXO
    /// lookup. One UTXO snapshot is used for every rebuild round.
    pub async fn build_transaction(
        &self,
        wallet: &Wallet,
        recipient: &str,
        amount: SendAmount,
    ) -> Result<BuiltTransaction, WalletError> {
        let recipient = self.parse_recipient(recipient)?;
        amount.check_dust()?;

        let address = wallet.address().to_string();
        let utxos = self
            .bounded("fetch utxos", self.source.fetch_utxos(&address))
            .await?;
        debug!(address = %address, count = utxos.len(), "fetched utxos");

        let policy = self.config.fee_policy;
        let recipient_script = recipient.script_pubkey();
        let own_script = wallet.keys().script_pubkey();

        let mut selection = CoinSelector::select(&utxos, amount, &policy)?;
        for round in 1..=MAX_FEE_ROUNDS {
            let unsigned =
                TransactionBuilder::from_selection(&selection, recipient_script.clone(), &own_script)?;
            let signed = sign_all(unsigned, wallet.keys())?;

            let vsize = signed.vsize();
            let required = policy.fee_for_vsize(vsize);
            if signed.fee() >= required {
                debug!(
                    round,
                    txid = %signed.txid(),
                    vsize,
                    fee = signed.fee(),
                    "transaction built"
                );
                return Ok(BuiltTransaction { signed, selection });
            }

            warn!(
                round,
                vsize,
                estimated_vsize = selection.estimated_vsize,
                fee = signed.fee(),
                required,
                "fee below rate for signed size, rebuilding"
            );
            selection = CoinSelector::resolve(&utxos, amount, required, vsize)?;
        }

        Err(WalletError::FeeNotConverged {
            rounds: MAX_FEE_ROUNDS,
        })
    }

    /// Build, sign and broadcast a payment.
    pub async fn build_and_send(
        &self,
        wallet: &Wallet,
        recipient: &str,
        amount: SendAmount,
    ) -> Result<SendReceipt, WalletError> {
        let BuiltTransaction { signed, selection } =
            self.build_transaction(wallet, recipient, amount).await?;

        let raw_hex = signed.raw_hex();
        let local_txid = signed.txid();
        let txid = self
            .bounded("broadcast", self.broadcaster.broadcast(&raw_hex))
            .await?;

        if txid != local_txid {
            warn!(%txid, %local_txid, "broadcaster reported a different txid");
        }
        info!(
            %txid,
            sent = selection.send_amount,
            fee = signed.fee(),
            change = selection.change,
            "transaction broadcast"
        );

        Ok(SendReceipt {
            txid,
            raw_hex,
            sent_amount: selection.send_amount,
            fee: signed.fee(),
            vsize: signed.vsize(),
            change: selection.change,
        })
    }

    /// Sweep every UTXO back to the wallet's own address.
    pub async fn self_transfer(&self, wallet: &Wallet) -> Result<SendReceipt, WalletError> {
        let own = wallet.address().to_string();
        self.build_and_send(wallet, &own, SendAmount::Max).await
    }

    /// Fetch a transaction and its indexer metadata, then parse it.
    pub async fn inspect_transaction(&self, txid: &Txid) -> Result<ParsedTransaction, WalletError> {
        let (raw_hex, detail) = tokio::try_join!(
            self.bounded("fetch raw tx", self.source.fetch_raw_tx_hex(txid)),
            self.bounded("fetch tx detail", self.source.fetch_tx_detail(txid)),
        )?;
        let parsed = parse_transaction(&raw_hex, &detail.witness_metadata(), self.config.network)?;
        debug!(%txid, has_spell = parsed.spell.is_some(), "transaction inspected");
        Ok(parsed)
    }

    pub async fn balance(&self, wallet: &Wallet) -> Result<AddressBalance, WalletError> {
        let address = wallet.address().to_string();
        self.bounded("fetch balance", self.source.fetch_address_balance(&address))
            .await
    }

    /// Most recent transactions touching the wallet address, newest first.
    pub async fn history(&self, wallet: &Wallet, limit: usize) -> Result<Vec<TxSummary>, WalletError> {
        let address = wallet.address().to_string();
        self.bounded(
            "fetch history",
            self.source.fetch_address_transactions(&address, limit),
        )
        .await
    }

    pub async fn utxos(&self, wallet: &Wallet) -> Result<Vec<Utxo>, WalletError> {
        let address = wallet.address().to_string();
        self.bounded("fetch utxos", self.source.fetch_utxos(&address))
            .await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, WalletError> {
        match tokio::time::timeout(self.config.io_timeout, call).await {
            Ok(result) => result.map_err(WalletError::from),
            Err(_) => {
                warn!(operation = what, timeout = ?self.config.io_timeout, "external call timed out");
                Err(WalletError::NetworkUnavailable(format!(
                    "{what} timed out after {:?}",
                    self.config.io_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bitcoin::hashes::Hash;
    use parking_lot::Mutex;
    use sigil_core::types::{TxDetail, TxStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ABANDON: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const RECIPIENT: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

    // --- Mock collaborators ---

    #[derive(Default)]
    struct MockSource {
        utxos: Vec<Utxo>,
        raw: Option<String>,
        detail: Option<TxDetail>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UtxoSource for MockSource {
        async fn fetch_utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.utxos.clone())
        }
        async fn fetch_raw_tx_hex(&self, txid: &Txid) -> Result<String, ProviderError> {
            self.raw.clone().ok_or_else(|| ProviderError::NotFound(txid.to_string()))
        }
        async fn fetch_tx_detail(&self, txid: &Txid) -> Result<TxDetail, ProviderError> {
            self.detail.clone().ok_or_else(|| ProviderError::NotFound(txid.to_string()))
        }
        async fn fetch_address_balance(&self, _: &str) -> Result<AddressBalance, ProviderError> {
            Ok(AddressBalance {
                confirmed_sats: 70_000,
                unconfirmed_sats: -5_000,
            })
        }
        async fn fetch_address_transactions(
            &self,
            _: &str,
            limit: usize,
        ) -> Result<Vec<TxSummary>, ProviderError> {
            Ok((0..10u8)
                .take(limit)
                .map(|i| TxSummary {
                    txid: Txid::from_byte_array([i; 32]),
                    status: TxStatus::default(),
                    fee: None,
                    size: None,
                    weight: None,
                    total_output_value: 1_000,
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct MockBroadcaster {
        sent: Mutex<Vec<String>>,
        reject: Option<String>,
        report_txid: Option<Txid>,
    }

    #[async_trait]
    impl Broadcaster for MockBroadcaster {
        async fn broadcast(&self, raw_hex: &str) -> Result<Txid, ProviderError> {
            if let Some(reason) = &self.reject {
                return Err(ProviderError::Rejected(reason.clone()));
            }
            self.sent.lock().push(raw_hex.to_string());
            if let Some(txid) = self.report_txid {
                return Ok(txid);
            }
            let parsed = parse_transaction(raw_hex, &[], Network::Testnet)
                .map_err(|e| ProviderError::Rejected(e.to_string()))?;
            Ok(parsed.txid)
        }
    }

    fn utxo(byte: u8, value: u64) -> Utxo {
        Utxo {
            txid: Txid::from_byte_array([byte; 32]),
            vout: 0,
            value,
            confirmed: true,
        }
    }

    fn wallet() -> Wallet {
        Wallet::import("alice", ABANDON, Network::Testnet).unwrap()
    }

    fn engine(source: MockSource, broadcaster: MockBroadcaster) -> (Arc<MockSource>, Arc<MockBroadcaster>, WalletEngine) {
        let source = Arc::new(source);
        let broadcaster = Arc::new(broadcaster);
        let engine = WalletEngine::new(source.clone(), broadcaster.clone(), EngineConfig::default());
        (source, broadcaster, engine)
    }

    fn funded(values: &[u64]) -> MockSource {
        MockSource {
            utxos: values.iter().enumerate().map(|(i, v)| utxo(i as u8 + 1, *v)).collect(),
            ..MockSource::default()
        }
    }

    #[tokio::test]
    async fn max_send_single_utxo() {
        let (_, broadcaster, engine) = engine(funded(&[100_000]), MockBroadcaster::default());
        let receipt = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Max)
            .await
            .unwrap();
        assert_eq!(receipt.fee, 500);
        assert_eq!(receipt.sent_amount, 99_500);
        assert_eq!(receipt.change, 0);
        assert_eq!(broadcaster.sent.lock().as_slice(), &[receipt.raw_hex.clone()]);

        let parsed = parse_transaction(&receipt.raw_hex, &[], Network::Testnet).unwrap();
        assert_eq!(parsed.outputs.len(), 1);
        assert_eq!(parsed.outputs[0].address.as_deref(), Some(RECIPIENT));
        assert_eq!(parsed.txid, receipt.txid);
    }

    #[tokio::test]
    async fn exact_send_pays_rate_for_signed_size() {
        let (_, _, engine) = engine(funded(&[30_000, 20_000]), MockBroadcaster::default());
        let receipt = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Exact(10_000))
            .await
            .unwrap();
        assert_eq!(receipt.sent_amount, 10_000);
        assert!(receipt.fee >= 624);
        assert!(receipt.fee >= receipt.vsize * 3);
        assert_eq!(receipt.sent_amount + receipt.change + receipt.fee, 50_000);

        let parsed = parse_transaction(&receipt.raw_hex, &[], Network::Testnet).unwrap();
        assert_eq!(parsed.inputs.len(), 2);
        assert_eq!(parsed.outputs.len(), 2);
        assert_eq!(parsed.outputs[1].value, receipt.change);
        assert_eq!(
            parsed.outputs[1].address.as_deref(),
            Some("tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl")
        );
    }

    #[tokio::test]
    async fn dust_amount_rejected_before_fetch() {
        let (source, _, engine) = engine(funded(&[100_000]), MockBroadcaster::default());
        let err = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Exact(500))
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::DustOutput { amount: 500, limit: 546 });
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_recipient_rejected_before_fetch() {
        let (source, _, engine) = engine(funded(&[100_000]), MockBroadcaster::default());
        let err = engine
            .build_and_send(&wallet(), "not-an-address", SendAmount::Max)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidRecipientAddress(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mainnet_recipient_rejected_on_testnet() {
        let (_, _, engine) = engine(funded(&[100_000]), MockBroadcaster::default());
        let err = engine
            .build_and_send(
                &wallet(),
                "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
                SendAmount::Max,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidRecipientAddress(_)));
    }

    #[tokio::test]
    async fn empty_wallet_has_no_utxos() {
        let (_, broadcaster, engine) = engine(MockSource::default(), MockBroadcaster::default());
        let err = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Exact(1_000))
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::NoUtxoAvailable);
        assert!(broadcaster.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn insufficient_funds_broadcasts_nothing() {
        let (_, broadcaster, engine) = engine(funded(&[5_000]), MockBroadcaster::default());
        let err = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Exact(5_000))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { have: 5_000, .. }));
        assert!(broadcaster.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn rejection_reason_is_verbatim() {
        let broadcaster = MockBroadcaster {
            reject: Some("bad-txns-inputs-missingorspent".into()),
            ..MockBroadcaster::default()
        };
        let (_, _, engine) = engine(funded(&[100_000]), broadcaster);
        let err = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Max)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::BroadcastRejected("bad-txns-inputs-missingorspent".into())
        );
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let source = MockSource {
            delay: Some(Duration::from_secs(30)),
            ..funded(&[100_000])
        };
        let source = Arc::new(source);
        let engine = WalletEngine::new(
            source,
            Arc::new(MockBroadcaster::default()),
            EngineConfig {
                io_timeout: Duration::from_millis(20),
                ..EngineConfig::default()
            },
        );
        let err = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Max)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::NetworkUnavailable(_)));
    }

    #[tokio::test]
    async fn broadcaster_txid_is_reported() {
        let reported = Txid::from_byte_array([0xee; 32]);
        let broadcaster = MockBroadcaster {
            report_txid: Some(reported),
            ..MockBroadcaster::default()
        };
        let (_, _, engine) = engine(funded(&[100_000]), broadcaster);
        let receipt = engine
            .build_and_send(&wallet(), RECIPIENT, SendAmount::Max)
            .await
            .unwrap();
        assert_eq!(receipt.txid, reported);
    }

    #[tokio::test]
    async fn self_transfer_sweeps_to_own_address() {
        let (_, _, engine) = engine(funded(&[40_000, 30_000, 1_000]), MockBroadcaster::default());
        let w = wallet();
        let receipt = engine.self_transfer(&w).await.unwrap();
        assert_eq!(receipt.change, 0);
        assert_eq!(receipt.sent_amount + receipt.fee, 71_000);

        let parsed = parse_transaction(&receipt.raw_hex, &[], Network::Testnet).unwrap();
        assert_eq!(parsed.inputs.len(), 3);
        assert_eq!(parsed.outputs.len(), 1);
        assert_eq!(parsed.outputs[0].address, Some(w.address().to_string()));
    }

    #[tokio::test]
    async fn build_without_broadcast() {
        let (_, broadcaster, engine) = engine(funded(&[100_000]), MockBroadcaster::default());
        let built = engine
            .build_transaction(&wallet(), RECIPIENT, SendAmount::Exact(20_000))
            .await
            .unwrap();
        assert!(broadcaster.sent.lock().is_empty());
        assert_eq!(built.selection.send_amount, 20_000);
        assert_eq!(built.signed.fee(), built.selection.fee);
    }

    #[tokio::test]
    async fn inspect_finds_witness_spell_from_detail() {
        // Build any signed transaction, then describe it with a witness spell.
        let (_, _, builder_engine) = engine(funded(&[100_000]), MockBroadcaster::default());
        let built = builder_engine
            .build_transaction(&wallet(), RECIPIENT, SendAmount::Max)
            .await
            .unwrap();
        let txid = built.signed.txid();
        let detail = TxDetail {
            txid,
            status: TxStatus {
                confirmed: true,
                block_height: Some(100),
                ..TxStatus::default()
            },
            fee: Some(500),
            size: None,
            weight: None,
            vin: vec![sigil_core::types::TxInputDetail {
                txid: Txid::from_byte_array([1; 32]),
                vout: 0,
                witness: Some(vec![hex::encode(br#"{"version":3,"apps":{}}"#)]),
                is_coinbase: false,
                sequence: u32::MAX,
                prevout_value: Some(100_000),
            }],
            vout: vec![],
        };
        let source = MockSource {
            raw: Some(built.signed.raw_hex()),
            detail: Some(detail),
            ..MockSource::default()
        };
        let (_, _, engine) = engine(source, MockBroadcaster::default());
        let parsed = engine.inspect_transaction(&txid).await.unwrap();
        assert_eq!(parsed.txid, txid);
        assert_eq!(parsed.inputs[0].confirmed, Some(true));
        assert_eq!(parsed.require_spell().unwrap().as_value()["version"], 3);
    }

    #[tokio::test]
    async fn inspect_unknown_tx_is_provider_error() {
        let (_, _, engine) = engine(MockSource::default(), MockBroadcaster::default());
        let err = engine
            .inspect_transaction(&Txid::from_byte_array([4; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Provider(_)));
    }

    #[tokio::test]
    async fn lookups_pass_through() {
        let (_, _, engine) = engine(funded(&[1_000, 2_000]), MockBroadcaster::default());
        let w = wallet();
        assert_eq!(engine.balance(&w).await.unwrap().total(), 65_000);
        assert_eq!(engine.history(&w, 3).await.unwrap().len(), 3);
        assert_eq!(engine.utxos(&w).await.unwrap().len(), 2);
    }

    #[test]
    fn default_config() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.fee_policy, FeePolicy::default());
        assert_eq!(cfg.io_timeout, Duration::from_secs(15));
    }
}
