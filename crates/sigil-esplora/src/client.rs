//! HTTP client for an Esplora-compatible indexer.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use sigil_core::error::ProviderError;
use sigil_core::traits::{Broadcaster, UtxoSource};
use sigil_core::types::{AddressBalance, TxDetail, TxSummary, Utxo};

use crate::dto::{EsploraAddress, EsploraTx, EsploraUtxo};

/// Esplora REST client. Implements both [`UtxoSource`] and [`Broadcaster`].
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    /// Client for `base_url` (e.g. `https://mempool.space/testnet4/api`) with
    /// a per-request `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NetworkUnavailable(format!("http client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Client over a preconfigured `reqwest` client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_text(&self, path: &str) -> Result<String, ProviderError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self.client.get(&url).send().await.map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(path.to_owned()));
        }
        if !status.is_success() {
            return Err(ProviderError::NetworkUnavailable(format!(
                "GET {path} returned {status}: {}",
                body.trim()
            )));
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let body = self.get_text(path).await?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("{path}: {e}")))
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::NetworkUnavailable(format!("timed out: {err}"))
    } else if err.is_decode() {
        ProviderError::MalformedResponse(err.to_string())
    } else {
        ProviderError::NetworkUnavailable(err.to_string())
    }
}

#[async_trait]
impl UtxoSource for EsploraClient {
    async fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        let utxos: Vec<EsploraUtxo> = self.get_json(&format!("address/{address}/utxo")).await?;
        Ok(utxos.into_iter().map(Utxo::from).collect())
    }

    async fn fetch_raw_tx_hex(&self, txid: &Txid) -> Result<String, ProviderError> {
        let body = self.get_text(&format!("tx/{txid}/hex")).await?;
        Ok(body.trim().to_owned())
    }

    async fn fetch_tx_detail(&self, txid: &Txid) -> Result<TxDetail, ProviderError> {
        let tx: EsploraTx = self.get_json(&format!("tx/{txid}")).await?;
        Ok(tx.into())
    }

    async fn fetch_address_balance(&self, address: &str) -> Result<AddressBalance, ProviderError> {
        let info: EsploraAddress = self.get_json(&format!("address/{address}")).await?;
        Ok(info.into())
    }

    async fn fetch_address_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TxSummary>, ProviderError> {
        let txs: Vec<EsploraTx> = self.get_json(&format!("address/{address}/txs")).await?;
        txs.into_iter()
            .take(limit)
            .map(EsploraTx::into_summary)
            .collect()
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn broadcast(&self, raw_hex: &str) -> Result<Txid, ProviderError> {
        let url = self.url("tx");
        debug!(%url, bytes = raw_hex.len() / 2, "POST");
        let resp = self
            .client
            .post(&url)
            .body(raw_hex.to_owned())
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            warn!(%status, reason = %body.trim(), "broadcast rejected");
            return Err(ProviderError::Rejected(body.trim().to_owned()));
        }
        Txid::from_str(body.trim())
            .map_err(|e| ProviderError::MalformedResponse(format!("broadcast txid {body:?}: {e}")))
    }
}
