//! BIP-39 mnemonic generation and validation.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::WalletError;

/// Entropy for a 12-word phrase.
const ENTROPY_BYTES: usize = 16;

/// Collapse runs of whitespace to single spaces and lower-case the phrase.
pub fn normalize_mnemonic(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse and checksum-validate an English BIP-39 phrase.
///
/// Normalizes whitespace and case before parsing.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = normalize_mnemonic(phrase);
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Generate a fresh 12-word phrase from the OS cryptographic RNG.
pub fn generate_mnemonic() -> Result<Mnemonic, WalletError> {
    let mut entropy = [0u8; ENTROPY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    mnemonic
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn generated_phrase_is_12_words_and_parses() {
        let m = generate_mnemonic().unwrap();
        let phrase = m.to_string();
        assert_eq!(phrase.split_whitespace().count(), 12, "got {phrase}");
        assert_eq!(parse_mnemonic(&phrase).unwrap(), m);
    }

    #[test]
    fn generated_phrases_differ() {
        let a = generate_mnemonic().unwrap();
        let b = generate_mnemonic().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn known_phrase_parses() {
        assert!(parse_mnemonic(ABANDON).is_ok());
    }

    /// Extra spaces, tabs and upper case must be normalized away.
    #[test]
    fn messy_phrase_is_normalized() {
        let messy = format!("  {}\t\n", ABANDON.to_uppercase().replace(' ', "   "));
        assert_eq!(normalize_mnemonic(&messy), ABANDON);
        assert_eq!(parse_mnemonic(&messy).unwrap(), parse_mnemonic(ABANDON).unwrap());
    }

    #[test]
    fn invalid_word_rejected() {
        let err = parse_mnemonic("abandon abandon abandon invalidword").unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
        assert!(err.to_string().contains("invalid mnemonic"));
    }

    /// Valid words, wrong last word.
    #[test]
    fn bad_checksum_rejected() {
        let phrase = format!("{} abandon", vec!["abandon"; 11].join(" "));
        assert!(matches!(
            parse_mnemonic(&phrase),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn wrong_word_count_rejected() {
        assert!(parse_mnemonic("abandon abandon").is_err());
        assert!(parse_mnemonic("").is_err());
    }
}
