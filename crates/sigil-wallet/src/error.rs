//! Wallet error types.

use sigil_core::error::{ParseError, ProviderError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
///
/// Every kind is surfaced to the caller as-is. Nothing in this crate retries
/// or downgrades an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Mnemonic fails word-list or checksum validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Master key construction, path parsing or child derivation failed.
    #[error("key derivation failed: {0}")]
    DerivationFailure(String),

    /// The address holds no spendable outputs.
    #[error("no UTXOs available")]
    NoUtxoAvailable,

    /// Total input value cannot cover the amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Total value of the UTXO set in satoshis.
        have: u64,
        /// Amount plus fee in satoshis.
        need: u64,
    },

    /// Requested amount is below the dust floor.
    #[error("amount {amount} is below the dust limit of {limit} sats")]
    DustOutput {
        amount: u64,
        limit: u64,
    },

    /// Recipient is not a valid address for the configured network.
    #[error("invalid recipient address: {0}")]
    InvalidRecipientAddress(String),

    /// An input has no prevout bound to it.
    #[error("input {index} has no witness commitment")]
    MissingWitnessCommitment {
        index: usize,
    },

    /// Signing an input failed.
    #[error("signature failure: {0}")]
    SignatureFailure(String),

    /// Finalize was attempted with unsigned inputs.
    #[error("all inputs must be signed, {missing} unsigned")]
    AllInputsMustBeSigned {
        missing: usize,
    },

    /// The relay refused the transaction. Carries its reason verbatim.
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    /// An external collaborator could not be reached or timed out.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Fee did not settle after the maximum number of rebuilds.
    #[error("fee did not converge after {rounds} rounds")]
    FeeNotConverged {
        rounds: usize,
    },

    /// A wallet is already registered for this user.
    #[error("wallet already exists for user {0}")]
    WalletExists(String),

    /// No wallet is registered for this user.
    #[error("no wallet for user {0}")]
    WalletNotFound(String),

    /// A lookup returned data that could not be used.
    #[error("provider: {0}")]
    Provider(String),

    /// Raw transaction decoding failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NetworkUnavailable(msg) => WalletError::NetworkUnavailable(msg),
            ProviderError::Rejected(reason) => WalletError::BroadcastRejected(reason),
            other => WalletError::Provider(other.to_string()),
        }
    }
}
