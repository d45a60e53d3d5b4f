//! Wallet storage.
//!
//! [`WalletRepository`] is the storage seam; [`MemoryWalletRepository`] keeps
//! wallets in process memory and offers no durability. [`WalletDirectory`]
//! applies the one-wallet-per-user rules on top of any repository.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::Network;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::WalletError;
use crate::wallet::Wallet;

/// Keyed wallet storage.
pub trait WalletRepository: Send + Sync {
    fn get(&self, user_id: &str) -> Option<Wallet>;

    /// Insert or replace the wallet stored under its user id.
    fn save(&self, wallet: Wallet);

    /// Remove and return the wallet for `user_id`.
    fn delete(&self, user_id: &str) -> Option<Wallet>;

    /// Store `wallet` unless its user already has one, as a single step.
    ///
    /// Returns `Ok` with the stored wallet, or `Err` with the wallet that was
    /// already present. The existing wallet is never replaced.
    fn insert_if_absent(&self, wallet: Wallet) -> Result<Wallet, Wallet>;

    fn contains(&self, user_id: &str) -> bool {
        self.get(user_id).is_some()
    }
}

/// In-memory repository.
#[derive(Default)]
pub struct MemoryWalletRepository {
    wallets: RwLock<HashMap<String, Wallet>>,
}

impl MemoryWalletRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.read().is_empty()
    }
}

impl WalletRepository for MemoryWalletRepository {
    fn get(&self, user_id: &str) -> Option<Wallet> {
        self.wallets.read().get(user_id).cloned()
    }

    fn save(&self, wallet: Wallet) {
        self.wallets.write().insert(wallet.user_id().to_string(), wallet);
    }

    fn delete(&self, user_id: &str) -> Option<Wallet> {
        self.wallets.write().remove(user_id)
    }

    fn insert_if_absent(&self, wallet: Wallet) -> Result<Wallet, Wallet> {
        match self.wallets.write().entry(wallet.user_id().to_string()) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(wallet.clone());
                Ok(wallet)
            }
        }
    }

    fn contains(&self, user_id: &str) -> bool {
        self.wallets.read().contains_key(user_id)
    }
}

/// Per-user wallet registry.
///
/// Each user owns at most one wallet. There is no shared fallback wallet:
/// a user without a wallet gets a freshly generated one of their own.
pub struct WalletDirectory {
    repo: Arc<dyn WalletRepository>,
    network: Network,
}

impl WalletDirectory {
    pub fn new(repo: Arc<dyn WalletRepository>, network: Network) -> Self {
        Self { repo, network }
    }

    /// The user's wallet, generating one on first use.
    pub fn create_wallet(&self, user_id: &str) -> Result<Wallet, WalletError> {
        if let Some(existing) = self.repo.get(user_id) {
            debug!(user = user_id, "wallet already registered");
            return Ok(existing);
        }
        let wallet = Wallet::generate(user_id, self.network)?;
        match self.repo.insert_if_absent(wallet) {
            Ok(wallet) => Ok(wallet),
            Err(existing) => {
                debug!(user = user_id, "concurrent create lost, keeping stored wallet");
                Ok(existing)
            }
        }
    }

    /// Register a wallet restored from `phrase`.
    ///
    /// Fails with [`WalletError::WalletExists`] if the user already has one.
    pub fn import_wallet(&self, user_id: &str, phrase: &str) -> Result<Wallet, WalletError> {
        if self.repo.contains(user_id) {
            return Err(WalletError::WalletExists(user_id.to_string()));
        }
        let wallet = Wallet::import(user_id, phrase, self.network)?;
        self.repo
            .insert_if_absent(wallet)
            .map_err(|_| WalletError::WalletExists(user_id.to_string()))
    }

    pub fn get_wallet(&self, user_id: &str) -> Result<Wallet, WalletError> {
        self.repo
            .get(user_id)
            .ok_or_else(|| WalletError::WalletNotFound(user_id.to_string()))
    }

    pub fn delete_wallet(&self, user_id: &str) -> Result<Wallet, WalletError> {
        self.repo
            .delete(user_id)
            .ok_or_else(|| WalletError::WalletNotFound(user_id.to_string()))
    }
}
