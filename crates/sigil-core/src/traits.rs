//! Collaborator contracts consumed by the wallet engine.
//!
//! - [`UtxoSource`] — UTXO set, raw transactions and address lookups (an indexer)
//! - [`Broadcaster`] — relays a finalized transaction to the network
//!
//! Both are transport-agnostic. `sigil-esplora` implements them over HTTP;
//! tests implement them in memory.

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::ProviderError;
use crate::types::{AddressBalance, TxDetail, TxSummary, Utxo};

/// Read access to chain data for an address.
///
/// Implementations must not cache: every call reflects the provider's
/// current view.
#[async_trait]
pub trait UtxoSource: Send + Sync {
    /// Current unspent outputs paying `address`.
    async fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Raw serialized transaction, hex-encoded.
    async fn fetch_raw_tx_hex(&self, txid: &Txid) -> Result<String, ProviderError>;

    /// Indexed transaction detail including per-input witness stacks.
    async fn fetch_tx_detail(&self, txid: &Txid) -> Result<TxDetail, ProviderError>;

    /// Confirmed and unconfirmed balance of `address`.
    async fn fetch_address_balance(&self, address: &str) -> Result<AddressBalance, ProviderError>;

    /// Most recent transactions touching `address`, newest first, at most `limit`.
    async fn fetch_address_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TxSummary>, ProviderError>;
}

/// Relays finalized transactions.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit a raw transaction. Returns the txid accepted by the network,
    /// or [`ProviderError::Rejected`] carrying the relay's reason verbatim.
    async fn broadcast(&self, raw_hex: &str) -> Result<Txid, ProviderError>;
}
