//! # sigil-core
//! Foundation types, collaborator traits and transaction parsing for Sigil.
//!
//! # Modules
//!
//! - [`constants`] — dust floor, fee floor, size model, derivation path
//! - [`error`] — `ProviderError`, `ParseError`
//! - [`types`] — UTXO and indexer lookup types
//! - [`traits`] — `UtxoSource` and `Broadcaster` collaborator contracts
//! - [`parser`] — raw transaction decoding with witness metadata
//! - [`spell`] — spell payload detection in data-carrier outputs and witnesses

pub mod constants;
pub mod error;
pub mod parser;
pub mod spell;
pub mod traits;
pub mod types;

pub use error::{ParseError, ProviderError};
pub use parser::{parse_transaction, ParsedInput, ParsedOutput, ParsedTransaction};
pub use spell::Spell;
pub use traits::{Broadcaster, UtxoSource};
pub use types::{
    AddressBalance, InputMetadata, TxDetail, TxInputDetail, TxOutputDetail, TxStatus, TxSummary,
    Utxo, WitnessMetadata,
};
