//! Error types shared across Sigil crates.
use thiserror::Error;

/// Failures reported by external collaborators (UTXO source, broadcaster).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network unavailable: {0}")] NetworkUnavailable(String),
    #[error("rejected: {0}")] Rejected(String),
    #[error("not found: {0}")] NotFound(String),
    #[error("malformed response: {0}")] MalformedResponse(String),
}

/// Failures while decoding a raw transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("decode: {0}")] Decode(String),
    #[error("metadata for {metadata} inputs, transaction has {inputs}")] MetadataMismatch { metadata: usize, inputs: usize },
    #[error("spell not found")] SpellNotFound,
}
