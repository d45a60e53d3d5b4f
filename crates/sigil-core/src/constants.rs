//! Wallet and relay-policy constants. All monetary values in satoshis.

/// Satoshis per bitcoin.
pub const COIN: u64 = 100_000_000;

/// Smallest output value the wallet will emit.
///
/// Outputs below this are uneconomical to spend and non-standard for relay.
/// Change below the floor is absorbed into the fee instead of being emitted.
pub const DUST_LIMIT: u64 = 546;

/// Absolute fee floor in satoshis, applied after the rate-based estimate.
pub const MIN_FEE: u64 = 500;

/// Default fee rate in sat/vB.
pub const DEFAULT_FEE_RATE: u64 = 3;

/// Fixed per-transaction overhead in virtual bytes (version, counts, lock time, segwit marker).
pub const TX_OVERHEAD_VBYTES: u64 = 10;

/// Virtual size of one P2WPKH input including its witness.
pub const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Virtual size of one P2WPKH output.
pub const P2WPKH_OUTPUT_VBYTES: u64 = 31;

/// BIP-84 derivation path for the single wallet key: purpose 84, coin type
/// testnet, account 0, external chain, index 0.
///
/// The path is fixed for the lifetime of a wallet regardless of network.
pub const DERIVATION_PATH: &str = "m/84'/1'/0'/0/0";

/// Number of estimate → build → measure rounds before giving up on fee convergence.
pub const MAX_FEE_ROUNDS: usize = 4;

/// `OP_RETURN`, the data-carrier opcode.
pub const OP_RETURN_BYTE: u8 = 0x6a;

/// Keys that mark a witness item as a spell candidate.
pub const SPELL_MARKER_KEYS: [&str; 4] = ["\"version\"", "\"apps\"", "\"ins\"", "\"outs\""];

/// Default Esplora-compatible indexer endpoint (testnet4).
pub const DEFAULT_ESPLORA_URL: &str = "https://mempool.space/testnet4/api";

/// Default bound on a single external I/O call, in seconds.
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 15;

/// Estimated virtual size for a transaction with the given input and output counts.
///
/// # Examples
///
/// ```
/// use sigil_core::constants::estimate_vsize;
/// assert_eq!(estimate_vsize(1, 1), 109);
/// assert_eq!(estimate_vsize(2, 2), 208);
/// ```
pub fn estimate_vsize(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_VBYTES
        .saturating_add(P2WPKH_INPUT_VBYTES.saturating_mul(inputs as u64))
        .saturating_add(P2WPKH_OUTPUT_VBYTES.saturating_mul(outputs as u64))
}

/// Fee for a virtual size at `fee_rate`, clamped to `min_fee`.
///
/// # Examples
///
/// ```
/// use sigil_core::constants::{fee_for_vsize, MIN_FEE};
/// assert_eq!(fee_for_vsize(109, 3, MIN_FEE), 500);
/// assert_eq!(fee_for_vsize(208, 3, MIN_FEE), 624);
/// ```
pub fn fee_for_vsize(vsize: u64, fee_rate: u64, min_fee: u64) -> u64 {
    vsize.saturating_mul(fee_rate).max(min_fee)
}
