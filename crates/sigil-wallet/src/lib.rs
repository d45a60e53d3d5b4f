//! # sigil-wallet — single-key BIP-84 wallet.
//!
//! Derives one P2WPKH key from a mnemonic, spends every UTXO on each send,
//! builds and signs segwit v0 transactions, and orchestrates sending and
//! inspection against injected chain collaborators.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`mnemonic`] — BIP-39 generation and validation
//! - [`keys`] — BIP-32/84 derivation of the wallet key
//! - [`coin_selection`] — spend-everything selection with fee and change rules
//! - [`builder`] — unsigned transaction assembly
//! - [`signer`] — BIP-143 signing and finalization
//! - [`wallet`] — per-user wallet record
//! - [`repository`] — wallet storage and the per-user directory
//! - [`engine`] — send, self-transfer and inspection flows

pub mod builder;
pub mod coin_selection;
pub mod engine;
pub mod error;
pub mod keys;
pub mod mnemonic;
pub mod repository;
pub mod signer;
pub mod wallet;

// Re-exports for convenient access
pub use builder::{TransactionBuilder, UnsignedTransaction};
pub use coin_selection::{CoinSelection, CoinSelector, FeePolicy, SendAmount};
pub use engine::{BuiltTransaction, EngineConfig, SendReceipt, WalletEngine};
pub use error::WalletError;
pub use keys::{derive_wallet, DerivedKeyMaterial};
pub use mnemonic::{generate_mnemonic, parse_mnemonic};
pub use repository::{MemoryWalletRepository, WalletDirectory, WalletRepository};
pub use signer::{finalize, sign_all, sign_input, SignedTransaction};
pub use wallet::Wallet;
