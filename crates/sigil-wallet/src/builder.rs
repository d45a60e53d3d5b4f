//! Unsigned transaction assembly.
//!
//! Provides a builder for segwit v0 transactions:
//! 1. Add inputs, each bound to the output it spends (the witness commitment)
//! 2. Add outputs in order
//! 3. Build, which validates commitments, dust and value balance
//!
//! [`TransactionBuilder::from_selection`] does all three for a
//! [`CoinSelection`]: recipient first, then change to the wallet's own script.

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use sigil_core::constants::DUST_LIMIT;

use crate::coin_selection::CoinSelection;
use crate::error::WalletError;

/// A transaction whose inputs are not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// The transaction with empty witnesses.
    pub tx: Transaction,
    /// Output spent by each input, index-aligned with `tx.input`.
    pub prevouts: Vec<TxOut>,
}

impl UnsignedTransaction {
    /// Sum of spent output values.
    pub fn input_value(&self) -> u64 {
        self.prevouts.iter().map(|p| p.value.to_sat()).sum()
    }

    /// Sum of emitted output values.
    pub fn output_value(&self) -> u64 {
        self.tx.output.iter().map(|o| o.value.to_sat()).sum()
    }

    /// Input value minus output value.
    pub fn fee(&self) -> u64 {
        self.input_value().saturating_sub(self.output_value())
    }
}

/// Builder for unsigned transactions.
///
/// # Example
/// ```ignore
/// let unsigned = TransactionBuilder::new()
///     .add_input(outpoint, Some(prevout))
///     .add_output(recipient.script_pubkey(), 10_000)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    inputs: Vec<(OutPoint, Option<TxOut>)>,
    outputs: Vec<TxOut>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input. `prevout` is the output being spent; segwit signing
    /// commits to its script and value, so building fails without it.
    pub fn add_input(&mut self, outpoint: OutPoint, prevout: Option<TxOut>) -> &mut Self {
        self.inputs.push((outpoint, prevout));
        self
    }

    pub fn add_output(&mut self, script_pubkey: ScriptBuf, value: u64) -> &mut Self {
        self.outputs.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        });
        self
    }

    /// Assemble the unsigned transaction.
    ///
    /// Version 2, lock time 0, every input final (`0xffffffff`).
    ///
    /// # Errors
    /// - [`WalletError::MissingWitnessCommitment`] — an input has no prevout
    /// - [`WalletError::DustOutput`] — an output is below the dust floor
    /// - [`WalletError::InsufficientFunds`] — outputs exceed inputs
    pub fn build(&self) -> Result<UnsignedTransaction, WalletError> {
        if self.inputs.is_empty() {
            return Err(WalletError::NoUtxoAvailable);
        }

        let mut input = Vec::with_capacity(self.inputs.len());
        let mut prevouts = Vec::with_capacity(self.inputs.len());
        for (index, (outpoint, prevout)) in self.inputs.iter().enumerate() {
            let prevout = prevout
                .clone()
                .ok_or(WalletError::MissingWitnessCommitment { index })?;
            input.push(TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
            prevouts.push(prevout);
        }

        for output in &self.outputs {
            let value = output.value.to_sat();
            if value < DUST_LIMIT && !output.script_pubkey.is_op_return() {
                return Err(WalletError::DustOutput {
                    amount: value,
                    limit: DUST_LIMIT,
                });
            }
        }

        let unsigned = UnsignedTransaction {
            tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input,
                output: self.outputs.clone(),
            },
            prevouts,
        };

        if unsigned.output_value() > unsigned.input_value() {
            return Err(WalletError::InsufficientFunds {
                have: unsigned.input_value(),
                need: unsigned.output_value(),
            });
        }

        Ok(unsigned)
    }

    /// Build the transaction for a coin selection.
    ///
    /// Every selected UTXO pays `own_script`, which is also where change goes.
    pub fn from_selection(
        selection: &CoinSelection,
        recipient_script: ScriptBuf,
        own_script: &ScriptBuf,
    ) -> Result<UnsignedTransaction, WalletError> {
        let mut builder = Self::new();
        for utxo in &selection.selected {
            builder.add_input(
                utxo.outpoint(),
                Some(TxOut {
                    value: Amount::from_sat(utxo.value),
                    script_pubkey: own_script.clone(),
                }),
            );
        }
        builder.add_output(recipient_script, selection.send_amount);
        if selection.has_change() {
            builder.add_output(own_script.clone(), selection.change);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin_selection::{CoinSelector, FeePolicy, SendAmount};
    use bitcoin::hashes::Hash;
    use bitcoin::script::PushBytesBuf;
    use bitcoin::{Txid, WPubkeyHash};
    use sigil_core::types::Utxo;

    fn script(byte: u8) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([byte; 20]))
    }

    fn prevout(value: u64) -> Option<TxOut> {
        Some(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script(0),
        })
    }

    fn outpoint(byte: u8) -> OutPoint {
        OutPoint::new(Txid::from_byte_array([byte; 32]), 0)
    }

    fn utxo(byte: u8, value: u64) -> Utxo {
        Utxo {
            txid: Txid::from_byte_array([byte; 32]),
            vout: 1,
            value,
            confirmed: true,
        }
    }

    #[test]
    fn build_sets_version_locktime_and_sequence() {
        let unsigned = TransactionBuilder::new()
            .add_input(outpoint(1), prevout(10_000))
            .add_output(script(2), 9_000)
            .build()
            .unwrap();
        assert_eq!(unsigned.tx.version, Version::TWO);
        assert_eq!(unsigned.tx.lock_time, LockTime::ZERO);
        assert_eq!(unsigned.tx.input[0].sequence, Sequence::MAX);
        assert!(unsigned.tx.input[0].witness.is_empty());
        assert!(unsigned.tx.input[0].script_sig.is_empty());
        assert_eq!(unsigned.fee(), 1_000);
    }

    #[test]
    fn missing_prevout_rejected_with_index() {
        let err = TransactionBuilder::new()
            .add_input(outpoint(1), prevout(10_000))
            .add_input(outpoint(2), None)
            .add_output(script(2), 9_000)
            .build()
            .unwrap_err();
        assert_eq!(err, WalletError::MissingWitnessCommitment { index: 1 });
    }

    #[test]
    fn dust_output_rejected() {
        let err = TransactionBuilder::new()
            .add_input(outpoint(1), prevout(10_000))
            .add_output(script(2), 545)
            .build()
            .unwrap_err();
        assert_eq!(err, WalletError::DustOutput { amount: 545, limit: 546 });
    }

    #[test]
    fn zero_value_data_carrier_allowed() {
        let unsigned = TransactionBuilder::new()
            .add_input(outpoint(1), prevout(10_000))
            .add_output(script(2), 9_000)
            .add_output(
                ScriptBuf::new_op_return(PushBytesBuf::try_from(vec![0x01, 0x02]).unwrap()),
                0,
            )
            .build()
            .unwrap();
        assert_eq!(unsigned.tx.output.len(), 2);
    }

    #[test]
    fn outputs_exceeding_inputs_rejected() {
        let err = TransactionBuilder::new()
            .add_input(outpoint(1), prevout(1_000))
            .add_output(script(2), 2_000)
            .build()
            .unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 1_000, need: 2_000 });
    }

    #[test]
    fn no_inputs_rejected() {
        let err = TransactionBuilder::new().add_output(script(2), 2_000).build().unwrap_err();
        assert_eq!(err, WalletError::NoUtxoAvailable);
    }

    #[test]
    fn from_selection_orders_recipient_then_change() {
        let utxos = [utxo(1, 30_000), utxo(2, 20_000)];
        let sel = CoinSelector::select(&utxos, SendAmount::Exact(10_000), &FeePolicy::default())
            .unwrap();
        let own = script(7);
        let unsigned = TransactionBuilder::from_selection(&sel, script(9), &own).unwrap();

        assert_eq!(unsigned.tx.input.len(), 2);
        assert_eq!(unsigned.tx.input[0].previous_output, utxos[0].outpoint());
        assert_eq!(unsigned.tx.input[1].previous_output.vout, 1);
        assert_eq!(unsigned.tx.output.len(), 2);
        assert_eq!(unsigned.tx.output[0].script_pubkey, script(9));
        assert_eq!(unsigned.tx.output[0].value.to_sat(), 10_000);
        assert_eq!(unsigned.tx.output[1].script_pubkey, own);
        assert_eq!(unsigned.tx.output[1].value.to_sat(), 39_376);
        assert!(unsigned.prevouts.iter().all(|p| p.script_pubkey == own));
        assert_eq!(unsigned.fee(), 624);
    }

    #[test]
    fn from_selection_without_change_has_one_output() {
        let sel = CoinSelector::select(&[utxo(1, 100_000)], SendAmount::Max, &FeePolicy::default())
            .unwrap();
        let unsigned = TransactionBuilder::from_selection(&sel, script(9), &script(7)).unwrap();
        assert_eq!(unsigned.tx.output.len(), 1);
        assert_eq!(unsigned.output_value(), 99_500);
        assert_eq!(unsigned.input_value(), 100_000);
    }
}
