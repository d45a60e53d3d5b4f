//! Segwit v0 input signing.
//!
//! Each input is signed over its BIP-143 digest with `SIGHASH_ALL`, which
//! commits to the spent output's script and value. ECDSA nonces are
//! deterministic (RFC 6979), so signing the same transaction twice yields the
//! same witness.

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, Transaction, Txid, Witness};

use crate::builder::UnsignedTransaction;
use crate::error::WalletError;
use crate::keys::DerivedKeyMaterial;

/// Sign input `index` of `unsigned` with the wallet key.
///
/// The spent output must pay the key's P2WPKH script.
pub fn sign_input(
    unsigned: &mut UnsignedTransaction,
    index: usize,
    keys: &DerivedKeyMaterial,
) -> Result<(), WalletError> {
    let prevout = unsigned
        .prevouts
        .get(index)
        .ok_or(WalletError::MissingWitnessCommitment { index })?;

    if prevout.script_pubkey != keys.script_pubkey() {
        return Err(WalletError::SignatureFailure(format!(
            "input {index} is not locked to the wallet key"
        )));
    }

    let sighash = SighashCache::new(&unsigned.tx)
        .p2wpkh_signature_hash(index, &prevout.script_pubkey, prevout.value, EcdsaSighashType::All)
        .map_err(|e| WalletError::SignatureFailure(format!("sighash for input {index}: {e}")))?;

    let secp = Secp256k1::signing_only();
    let secret = keys.secret_key()?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, &secret),
        sighash_type: EcdsaSighashType::All,
    };

    let mut witness = Witness::new();
    witness.push(signature.serialize());
    witness.push(keys.public_key().to_bytes());
    unsigned.tx.input[index].witness = witness;
    Ok(())
}

/// Seal a fully signed transaction.
///
/// Fails with [`WalletError::AllInputsMustBeSigned`] if any input still has
/// an empty witness.
pub fn finalize(unsigned: UnsignedTransaction) -> Result<SignedTransaction, WalletError> {
    let missing = unsigned
        .tx
        .input
        .iter()
        .filter(|input| input.witness.is_empty())
        .count();
    if missing > 0 {
        return Err(WalletError::AllInputsMustBeSigned { missing });
    }
    let fee = unsigned.fee();
    Ok(SignedTransaction {
        tx: unsigned.tx,
        fee,
    })
}

/// Sign every input in order, then finalize.
pub fn sign_all(
    mut unsigned: UnsignedTransaction,
    keys: &DerivedKeyMaterial,
) -> Result<SignedTransaction, WalletError> {
    for index in 0..unsigned.tx.input.len() {
        sign_input(&mut unsigned, index, keys)?;
    }
    finalize(unsigned)
}

/// A finalized, fully witnessed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: Transaction,
    fee: u64,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Consensus serialization, hex-encoded, witness included.
    pub fn raw_hex(&self) -> String {
        serialize_hex(&self.tx)
    }

    /// Hash of the serialization without witness data.
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    pub fn vsize(&self) -> u64 {
        self.tx.vsize() as u64
    }

    pub fn weight(&self) -> u64 {
        self.tx.weight().to_wu()
    }

    /// Input value minus output value.
    pub fn fee(&self) -> u64 {
        self.fee
    }
}
