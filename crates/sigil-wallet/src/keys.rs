//! BIP-84 key derivation.
//!
//! A mnemonic is stretched to a 64-byte BIP-39 seed (empty passphrase), a
//! BIP-32 master key is built from it, and the single wallet key is derived
//! at [`DERIVATION_PATH`]. The wallet receives on, and returns change to, the
//! P2WPKH address of that key.

use std::fmt;
use std::str::FromStr;

use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, Network, ScriptBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use sigil_core::constants::DERIVATION_PATH;

use crate::error::WalletError;
use crate::mnemonic::parse_mnemonic;

/// Key material for the wallet's single receive/change key.
///
/// The secret is zeroized on drop and never printed by `Debug`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeyMaterial {
    secret: [u8; 32],
    #[zeroize(skip)]
    public_key: CompressedPublicKey,
    #[zeroize(skip)]
    address: Address,
}

impl DerivedKeyMaterial {
    /// Compressed 33-byte public key.
    pub fn public_key(&self) -> CompressedPublicKey {
        self.public_key
    }

    /// P2WPKH address of the key.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Locking script paying this key.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&self.public_key.wpubkey_hash())
    }

    /// The signing key. Parse only where a signature is produced.
    pub fn secret_key(&self) -> Result<SecretKey, WalletError> {
        SecretKey::from_slice(&self.secret)
            .map_err(|e| WalletError::SignatureFailure(format!("invalid secret key: {e}")))
    }

    /// Hex encoding of the 32-byte secret. Handle with care.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret)
    }
}

impl Clone for DerivedKeyMaterial {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
            public_key: self.public_key,
            address: self.address.clone(),
        }
    }
}

impl fmt::Debug for DerivedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeyMaterial")
            .field("secret", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .field("address", &self.address.to_string())
            .finish()
    }
}

/// Validate `phrase` and derive the wallet key for `network`.
pub fn derive_wallet(phrase: &str, network: Network) -> Result<DerivedKeyMaterial, WalletError> {
    let mnemonic = parse_mnemonic(phrase)?;
    derive_from_mnemonic(&mnemonic, network)
}

/// Derive the wallet key from an already validated mnemonic.
pub fn derive_from_mnemonic(
    mnemonic: &Mnemonic,
    network: Network,
) -> Result<DerivedKeyMaterial, WalletError> {
    let mut seed = mnemonic.to_seed("");
    let master = Xpriv::new_master(network, &seed);
    seed.zeroize();
    let master = master.map_err(|e| WalletError::DerivationFailure(format!("master key: {e}")))?;

    let path = DerivationPath::from_str(DERIVATION_PATH)
        .map_err(|e| WalletError::DerivationFailure(format!("path {DERIVATION_PATH}: {e}")))?;

    let secp = Secp256k1::new();
    let child = master
        .derive_priv(&secp, &path)
        .map_err(|e| WalletError::DerivationFailure(format!("child key: {e}")))?;

    let public_key = CompressedPublicKey(PublicKey::from_secret_key(&secp, &child.private_key));
    let address = Address::p2wpkh(&public_key, network);

    Ok(DerivedKeyMaterial {
        secret: child.private_key.secret_bytes(),
        public_key,
        address,
    })
}
