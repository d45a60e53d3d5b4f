//! Spell payload detection.
//!
//! A spell is an application-level JSON document carried either in a
//! data-carrier (`OP_RETURN`) output or in an input's witness stack. This
//! module only locates and parses it; the protocol that consumes spells
//! validates their meaning.

use std::fmt;

use bitcoin::script::{Instruction, Script};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{OP_RETURN_BYTE, SPELL_MARKER_KEYS};

/// An opaque spell document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(transparent)]
pub struct Spell(Value);

impl Spell {
    /// Wrap an already parsed JSON value.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// The parsed JSON document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Display for Spell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bytes carried by a data-carrier script, or `None` if `script` is not one.
///
/// Push operations after `OP_RETURN` are concatenated. If the remainder is not
/// a clean sequence of pushes, the raw bytes after the opcode are returned.
pub fn data_carrier_payload(script: &Script) -> Option<Vec<u8>> {
    let bytes = script.as_bytes();
    if bytes.first() != Some(&OP_RETURN_BYTE) {
        return None;
    }
    let rest = &bytes[1..];

    let mut payload = Vec::with_capacity(rest.len());
    for instruction in Script::from_bytes(rest).instructions() {
        match instruction {
            Ok(Instruction::PushBytes(push)) => payload.extend_from_slice(push.as_bytes()),
            _ => return Some(rest.to_vec()),
        }
    }
    Some(payload)
}

/// Parse a data-carrier payload as a spell.
///
/// The payload must be UTF-8 text starting with `{` or `[` that parses as JSON.
pub fn spell_from_data_carrier(payload: &[u8]) -> Option<Spell> {
    let text = std::str::from_utf8(payload).ok()?;
    if !text.starts_with('{') && !text.starts_with('[') {
        return None;
    }
    serde_json::from_str(text).ok().map(Spell)
}

/// Parse a single witness item as a spell.
///
/// The item must be UTF-8 text starting with `{` that names at least one of
/// the spell keys (`version`, `apps`, `ins`, `outs`) and parses as JSON.
pub fn spell_from_witness_item(item: &[u8]) -> Option<Spell> {
    let text = std::str::from_utf8(item).ok()?;
    if !text.starts_with('{') {
        return None;
    }
    if !SPELL_MARKER_KEYS.iter().any(|key| text.contains(key)) {
        return None;
    }
    serde_json::from_str(text).ok().map(Spell)
}
