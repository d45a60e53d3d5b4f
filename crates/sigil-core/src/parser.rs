//! Raw transaction decoding.
//!
//! Turns a hex-encoded transaction plus optional indexer metadata into
//! structured inputs and outputs, and locates an embedded [`Spell`].
//!
//! Witness stacks are taken from the metadata when supplied, since an
//! indexer may know witness data the raw hex does not carry; otherwise the
//! witness decoded from the transaction itself is used.

use bitcoin::{Address, Network, Transaction, Txid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ParseError;
use crate::spell::{data_carrier_payload, spell_from_data_carrier, spell_from_witness_item, Spell};
use crate::types::InputMetadata;

/// A decoded transaction input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ParsedInput {
    /// Transaction containing the spent output.
    pub txid: Txid,
    pub vout: u32,
    /// Unlocking script, hex-encoded. Absent when empty.
    pub script_sig: Option<String>,
    /// Witness stack items, hex-encoded. Absent when unknown or empty.
    pub witness: Option<Vec<String>>,
    pub sequence: u32,
    /// Confirmation status from metadata, when supplied.
    pub confirmed: Option<bool>,
}

/// A decoded transaction output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ParsedOutput {
    pub value: u64,
    /// Locking script, hex-encoded.
    pub script_pubkey: String,
    /// Address for standard scripts on the parsing network.
    pub address: Option<String>,
    /// Data-carrier payload: text when it looks like JSON, hex otherwise.
    pub op_return: Option<String>,
}

/// Structured view of a raw transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ParsedTransaction {
    pub txid: Txid,
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<ParsedInput>,
    pub outputs: Vec<ParsedOutput>,
    pub spell: Option<Spell>,
    /// Serialized size in bytes, witness included.
    pub size: usize,
    pub weight: u64,
    pub vsize: usize,
}

impl ParsedTransaction {
    /// The embedded spell, or [`ParseError::SpellNotFound`].
    ///
    /// Absence of a spell is an ordinary outcome; callers that only want to
    /// report it should read [`spell`](Self::spell) directly.
    pub fn require_spell(&self) -> Result<&Spell, ParseError> {
        self.spell.as_ref().ok_or(ParseError::SpellNotFound)
    }

    /// Sum of all output values in satoshis.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// Decode `raw_hex`, attaching per-input `metadata` in order.
///
/// `metadata` may be shorter than the input list (including empty). It may
/// not be longer.
pub fn parse_transaction(
    raw_hex: &str,
    metadata: &[InputMetadata],
    network: Network,
) -> Result<ParsedTransaction, ParseError> {
    let bytes = hex::decode(raw_hex.trim()).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    let tx: Transaction =
        bitcoin::consensus::deserialize(&bytes).map_err(|e| ParseError::Decode(e.to_string()))?;

    if metadata.len() > tx.input.len() {
        return Err(ParseError::MetadataMismatch {
            metadata: metadata.len(),
            inputs: tx.input.len(),
        });
    }

    let inputs: Vec<ParsedInput> = tx
        .input
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let meta = metadata.get(i);
            let witness = meta.and_then(|m| m.witness.clone()).or_else(|| {
                (!input.witness.is_empty())
                    .then(|| input.witness.iter().map(hex::encode).collect())
            });
            ParsedInput {
                txid: input.previous_output.txid,
                vout: input.previous_output.vout,
                script_sig: (!input.script_sig.is_empty())
                    .then(|| hex::encode(input.script_sig.as_bytes())),
                witness,
                sequence: input.sequence.0,
                confirmed: meta.and_then(|m| m.confirmed),
            }
        })
        .collect();

    let mut spell = None;
    let mut outputs = Vec::with_capacity(tx.output.len());
    for (i, output) in tx.output.iter().enumerate() {
        let payload = data_carrier_payload(&output.script_pubkey);
        if spell.is_none() {
            if let Some(found) = payload.as_deref().and_then(spell_from_data_carrier) {
                debug!(output = i, "spell found in data-carrier output");
                spell = Some(found);
            }
        }
        outputs.push(ParsedOutput {
            value: output.value.to_sat(),
            script_pubkey: hex::encode(output.script_pubkey.as_bytes()),
            address: Address::from_script(&output.script_pubkey, network)
                .ok()
                .map(|a| a.to_string()),
            op_return: payload.map(|p| describe_payload(&p)),
        });
    }

    if spell.is_none() {
        spell = find_witness_spell(&inputs);
    }

    Ok(ParsedTransaction {
        txid: tx.compute_txid(),
        version: tx.version.0,
        lock_time: tx.lock_time.to_consensus_u32(),
        inputs,
        outputs,
        spell,
        size: tx.total_size(),
        weight: tx.weight().to_wu(),
        vsize: tx.vsize(),
    })
}

fn find_witness_spell(inputs: &[ParsedInput]) -> Option<Spell> {
    for (i, input) in inputs.iter().enumerate() {
        let Some(witness) = &input.witness else {
            continue;
        };
        for item in witness {
            let Ok(bytes) = hex::decode(item) else {
                continue;
            };
            if let Some(found) = spell_from_witness_item(&bytes) {
                debug!(input = i, "spell found in witness");
                return Some(found);
            }
        }
    }
    None
}

fn describe_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.starts_with('{') || text.starts_with('[') => text.to_string(),
        _ => hex::encode(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::script::PushBytesBuf;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, WPubkeyHash, Witness};
    use serde_json::json;

    fn p2wpkh_script(byte: u8) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([byte; 20]))
    }

    fn op_return(data: &[u8]) -> ScriptBuf {
        ScriptBuf::new_op_return(PushBytesBuf::try_from(data.to_vec()).unwrap())
    }

    fn input(byte: u8, witness: &[&[u8]]) -> TxIn {
        TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([byte; 32]), byte as u32),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::from_slice(witness),
        }
    }

    fn tx(inputs: Vec<TxIn>, outputs: Vec<(u64, ScriptBuf)>) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs,
            output: outputs
                .into_iter()
                .map(|(value, script_pubkey)| TxOut {
                    value: Amount::from_sat(value),
                    script_pubkey,
                })
                .collect(),
        }
    }

    fn hex_of(tx: &Transaction) -> String {
        bitcoin::consensus::encode::serialize_hex(tx)
    }

    #[test]
    fn spell_in_data_carrier_output() {
        let payload = br#"{"version":1,"ins":[],"outs":[]}"#;
        let t = tx(
            vec![input(1, &[&[0x30; 71], &[0x02; 33]])],
            vec![(0, op_return(payload)), (10_000, p2wpkh_script(7))],
        );
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert_eq!(
            parsed.spell.as_ref().unwrap().as_value(),
            &json!({"version": 1, "ins": [], "outs": []})
        );
        assert_eq!(
            parsed.outputs[0].op_return.as_deref(),
            Some(r#"{"version":1,"ins":[],"outs":[]}"#)
        );
    }

    #[test]
    fn spell_in_metadata_witness() {
        let t = tx(vec![input(1, &[])], vec![(5_000, p2wpkh_script(7))]);
        let spell_hex = hex::encode(br#"{"apps":{},"ins":[]}"#);
        let meta = vec![InputMetadata {
            witness: Some(vec!["00".into(), spell_hex]),
            confirmed: Some(true),
        }];
        let parsed = parse_transaction(&hex_of(&t), &meta, Network::Testnet).unwrap();
        assert_eq!(parsed.require_spell().unwrap().as_value(), &json!({"apps": {}, "ins": []}));
        assert_eq!(parsed.inputs[0].confirmed, Some(true));
    }

    #[test]
    fn spell_in_transaction_witness_without_metadata() {
        let item = br#"{"version":4,"outs":[{"0":1}]}"#;
        let t = tx(vec![input(1, &[&item[..]])], vec![(5_000, p2wpkh_script(7))]);
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert_eq!(parsed.spell.unwrap().as_value()["version"], json!(4));
    }

    #[test]
    fn data_carrier_spell_wins_over_witness() {
        let witness_item = br#"{"version":9}"#;
        let t = tx(
            vec![input(1, &[&witness_item[..]])],
            vec![(0, op_return(br#"{"version":1}"#))],
        );
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert_eq!(parsed.spell.unwrap().as_value()["version"], json!(1));
    }

    #[test]
    fn first_data_carrier_spell_wins() {
        let t = tx(
            vec![input(1, &[])],
            vec![
                (0, op_return(b"not json")),
                (0, op_return(br#"{"version":2}"#)),
                (0, op_return(br#"{"version":3}"#)),
            ],
        );
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert_eq!(parsed.spell.unwrap().as_value()["version"], json!(2));
        assert_eq!(parsed.outputs[0].op_return.as_deref(), Some(hex::encode(b"not json").as_str()));
    }

    #[test]
    fn missing_spell_is_not_an_error() {
        let t = tx(
            vec![input(1, &[&[0x30; 71], &[0x02; 33]])],
            vec![(9_000, p2wpkh_script(3))],
        );
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert!(parsed.spell.is_none());
        assert_eq!(parsed.require_spell().unwrap_err(), ParseError::SpellNotFound);
    }

    #[test]
    fn decodes_inputs_and_outputs() {
        let t = tx(
            vec![input(1, &[&[0xaa; 72], &[0x03; 33]]), input(2, &[&[0xbb; 71], &[0x02; 33]])],
            vec![(10_000, p2wpkh_script(1)), (39_376, p2wpkh_script(2))],
        );
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert_eq!(parsed.txid, t.compute_txid());
        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.inputs.len(), 2);
        assert_eq!(parsed.inputs[1].txid, Txid::from_byte_array([2; 32]));
        assert_eq!(parsed.inputs[1].vout, 2);
        assert_eq!(parsed.inputs[0].sequence, u32::MAX);
        assert_eq!(parsed.inputs[0].witness.as_ref().unwrap().len(), 2);
        assert!(parsed.inputs[0].script_sig.is_none());
        assert_eq!(parsed.outputs[1].value, 39_376);
        assert_eq!(parsed.total_output_value(), 49_376);
        assert_eq!(parsed.vsize, t.vsize());
        assert_eq!(parsed.weight, t.weight().to_wu());
    }

    #[test]
    fn standard_output_gets_testnet_address() {
        let t = tx(vec![input(1, &[])], vec![(1_000, p2wpkh_script(9))]);
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        let address = parsed.outputs[0].address.as_deref().unwrap();
        assert!(address.starts_with("tb1q"), "got {address}");
    }

    #[test]
    fn nonstandard_output_has_no_address() {
        let t = tx(
            vec![input(1, &[])],
            vec![(1_000, ScriptBuf::from_bytes(vec![0x51, 0x52, 0x93]))],
        );
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert!(parsed.outputs[0].address.is_none());
        assert!(parsed.outputs[0].op_return.is_none());
    }

    #[test]
    fn script_sig_is_reported() {
        let mut t = tx(vec![input(1, &[])], vec![(1_000, p2wpkh_script(9))]);
        t.input[0].script_sig = ScriptBuf::from_bytes(vec![0x01, 0xff]);
        let parsed = parse_transaction(&hex_of(&t), &[], Network::Testnet).unwrap();
        assert_eq!(parsed.inputs[0].script_sig.as_deref(), Some("01ff"));
    }

    #[test]
    fn metadata_witness_overrides_decoded_witness() {
        let t = tx(vec![input(1, &[&[0x01]])], vec![(1_000, p2wpkh_script(9))]);
        let meta = vec![InputMetadata {
            witness: Some(vec!["beef".into()]),
            confirmed: None,
        }];
        let parsed = parse_transaction(&hex_of(&t), &meta, Network::Testnet).unwrap();
        assert_eq!(parsed.inputs[0].witness, Some(vec!["beef".to_string()]));
    }

    #[test]
    fn invalid_hex_rejected() {
        let err = parse_transaction("zz11", &[], Network::Testnet).unwrap_err();
        assert!(matches!(err, ParseError::InvalidHex(_)));
    }

    #[test]
    fn truncated_transaction_rejected() {
        let t = tx(vec![input(1, &[])], vec![(1_000, p2wpkh_script(9))]);
        let full = hex_of(&t);
        let err = parse_transaction(&full[..full.len() - 8], &[], Network::Testnet).unwrap_err();
        assert!(matches!(err, ParseError::Decode(_)));
    }

    #[test]
    fn surplus_metadata_rejected() {
        let t = tx(vec![input(1, &[])], vec![(1_000, p2wpkh_script(9))]);
        let meta = vec![InputMetadata::default(), InputMetadata::default()];
        let err = parse_transaction(&hex_of(&t), &meta, Network::Testnet).unwrap_err();
        assert_eq!(err, ParseError::MetadataMismatch { metadata: 2, inputs: 1 });
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let t = tx(vec![input(1, &[])], vec![(1_000, p2wpkh_script(9))]);
        let padded = format!("  {}\n", hex_of(&t));
        assert!(parse_transaction(&padded, &[], Network::Testnet).is_ok());
    }
}
