//! Spend-everything coin selection.
//!
//! Every available UTXO is consumed on every send, which doubles as
//! consolidation. The fee is estimated from a fixed P2WPKH size model and
//! clamped to a floor. A remainder below the dust limit is never emitted as
//! change; it is added to the fee.

use serde::{Deserialize, Serialize};
use tracing::debug;

use sigil_core::constants::{estimate_vsize, fee_for_vsize, DEFAULT_FEE_RATE, DUST_LIMIT, MIN_FEE};
use sigil_core::types::Utxo;

use crate::error::WalletError;

/// How much to send.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendAmount {
    /// Exactly this many satoshis; the rest returns as change.
    Exact(u64),
    /// Everything left after the fee. Produces no change output.
    Max,
}

impl SendAmount {
    /// Outputs assumed by the size estimate: recipient plus change for
    /// [`Exact`](Self::Exact), recipient only for [`Max`](Self::Max).
    pub fn estimated_outputs(&self) -> usize {
        match self {
            SendAmount::Exact(_) => 2,
            SendAmount::Max => 1,
        }
    }

    /// Reject explicit amounts below the dust floor.
    pub fn check_dust(&self) -> Result<(), WalletError> {
        match *self {
            SendAmount::Exact(amount) if amount < DUST_LIMIT => Err(WalletError::DustOutput {
                amount,
                limit: DUST_LIMIT,
            }),
            _ => Ok(()),
        }
    }
}

/// Fee rate and floor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeePolicy {
    /// Satoshis per virtual byte.
    pub fee_rate: u64,
    /// Absolute floor in satoshis. Values below [`MIN_FEE`] are raised to it.
    pub min_fee: u64,
}

impl FeePolicy {
    pub fn fee_for_vsize(&self, vsize: u64) -> u64 {
        fee_for_vsize(vsize, self.fee_rate, self.min_fee.max(MIN_FEE))
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            min_fee: MIN_FEE,
        }
    }
}

/// Result of coin selection: inputs and the value breakdown.
///
/// `total_input == send_amount + change + fee` always holds. `change` is
/// either zero (no change output) or at least [`DUST_LIMIT`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CoinSelection {
    /// UTXOs to spend, in the order they were supplied.
    pub selected: Vec<Utxo>,
    /// Sum of the selected values.
    pub total_input: u64,
    /// Value of the recipient output.
    pub send_amount: u64,
    /// Fee paid, including any absorbed sub-dust remainder.
    pub fee: u64,
    /// Value of the change output, zero when there is none.
    pub change: u64,
    /// Virtual size the fee was computed for.
    pub estimated_vsize: u64,
}

impl CoinSelection {
    pub fn has_change(&self) -> bool {
        self.change > 0
    }

    /// Number of outputs the transaction will carry.
    pub fn output_count(&self) -> usize {
        if self.has_change() { 2 } else { 1 }
    }
}

/// Selects all UTXOs and settles the fee and change.
pub struct CoinSelector;

impl CoinSelector {
    /// Estimate the size for `utxos` and `amount`, then resolve at the
    /// policy fee for that estimate.
    pub fn select(
        utxos: &[Utxo],
        amount: SendAmount,
        policy: &FeePolicy,
    ) -> Result<CoinSelection, WalletError> {
        let estimated_vsize = estimate_vsize(utxos.len(), amount.estimated_outputs());
        let fee = policy.fee_for_vsize(estimated_vsize);
        Self::resolve(utxos, amount, fee, estimated_vsize)
    }

    /// Apply the amount and change rules for an explicitly given fee.
    ///
    /// # Errors
    /// - [`WalletError::DustOutput`] — `Exact` amount below the dust floor
    /// - [`WalletError::NoUtxoAvailable`] — `utxos` is empty
    /// - [`WalletError::InsufficientFunds`] — amount plus fee exceeds the total,
    ///   or `Max` would leave less than the dust floor to send
    pub fn resolve(
        utxos: &[Utxo],
        amount: SendAmount,
        fee: u64,
        estimated_vsize: u64,
    ) -> Result<CoinSelection, WalletError> {
        amount.check_dust()?;
        if utxos.is_empty() {
            return Err(WalletError::NoUtxoAvailable);
        }

        let total_input = Utxo::total_value(utxos)
            .ok_or_else(|| WalletError::Provider("UTXO values overflow".into()))?;

        let (send_amount, fee, change) = match amount {
            SendAmount::Exact(send) => {
                let need = send.saturating_add(fee);
                if need > total_input {
                    return Err(WalletError::InsufficientFunds {
                        have: total_input,
                        need,
                    });
                }
                let remainder = total_input - need;
                if remainder >= DUST_LIMIT {
                    (send, fee, remainder)
                } else {
                    (send, fee + remainder, 0)
                }
            }
            SendAmount::Max => {
                let send = total_input.saturating_sub(fee);
                if send < DUST_LIMIT {
                    return Err(WalletError::InsufficientFunds {
                        have: total_input,
                        need: fee.saturating_add(DUST_LIMIT),
                    });
                }
                (send, fee, 0)
            }
        };

        debug!(
            inputs = utxos.len(),
            total_input,
            send_amount,
            fee,
            change,
            estimated_vsize,
            "coin selection resolved"
        );

        Ok(CoinSelection {
            selected: utxos.to_vec(),
            total_input,
            send_amount,
            fee,
            change,
            estimated_vsize,
        })
    }
}
