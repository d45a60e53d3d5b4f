//! # sigil-esplora
//! Esplora REST provider for Sigil.
//!
//! [`EsploraClient`] implements [`sigil_core::UtxoSource`] and
//! [`sigil_core::Broadcaster`] against any Esplora-compatible indexer
//! (mempool.space, Blockstream). Transport failures and timeouts map to
//! `ProviderError::NetworkUnavailable`, missing resources to `NotFound`,
//! undecodable bodies to `MalformedResponse`, and refused broadcasts to
//! `Rejected` carrying the relay's message.

pub mod client;
pub mod dto;

pub use client::EsploraClient;
