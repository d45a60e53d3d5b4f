//! Integration test suite for Sigil.
//!
//! Drives the wallet engine end to end against an in-memory chain that
//! verifies every broadcast transaction the way a relaying node would.

pub mod helpers;
