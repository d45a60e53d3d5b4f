//! Per-user wallet record.
//!
//! A wallet is created once, by generation or import, and never changes
//! afterwards. It owns the mnemonic and the key derived from it; every engine
//! operation takes the wallet explicitly.

use std::fmt;

use bitcoin::{Address, Network};
use chrono::{DateTime, Utc};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;
use crate::keys::{derive_from_mnemonic, DerivedKeyMaterial};
use crate::mnemonic::{generate_mnemonic, parse_mnemonic};

/// A user's single-key wallet.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Wallet {
    #[zeroize(skip)]
    user_id: String,
    mnemonic: String,
    #[zeroize(skip)]
    keys: DerivedKeyMaterial,
    #[zeroize(skip)]
    network: Network,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a wallet from a fresh 12-word mnemonic.
    pub fn generate(user_id: impl Into<String>, network: Network) -> Result<Self, WalletError> {
        let mnemonic = generate_mnemonic()?;
        let wallet = Self::from_parts(user_id.into(), mnemonic, network)?;
        info!(user = %wallet.user_id, address = %wallet.address(), "generated wallet");
        Ok(wallet)
    }

    /// Restore a wallet from an existing phrase.
    pub fn import(
        user_id: impl Into<String>,
        phrase: &str,
        network: Network,
    ) -> Result<Self, WalletError> {
        let mnemonic = parse_mnemonic(phrase)?;
        let wallet = Self::from_parts(user_id.into(), mnemonic, network)?;
        info!(user = %wallet.user_id, address = %wallet.address(), "imported wallet");
        Ok(wallet)
    }

    fn from_parts(
        user_id: String,
        mnemonic: bip39::Mnemonic,
        network: Network,
    ) -> Result<Self, WalletError> {
        let keys = derive_from_mnemonic(&mnemonic, network)?;
        Ok(Self {
            user_id,
            mnemonic: mnemonic.to_string(),
            keys,
            network,
            created_at: Utc::now(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Receive and change address.
    pub fn address(&self) -> &Address {
        self.keys.address()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The backup phrase. Handle with care.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Hex-encoded private key. Handle with care.
    pub fn private_key_hex(&self) -> String {
        self.keys.private_key_hex()
    }

    pub fn keys(&self) -> &DerivedKeyMaterial {
        &self.keys
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("user_id", &self.user_id)
            .field("address", &self.address().to_string())
            .field("mnemonic", &"[REDACTED]")
            .field("network", &self.network)
            .field("created_at", &self.created_at)
            .finish()
    }
}
