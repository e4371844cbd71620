//! Compressed text expansion.
//!
//! OpenTV broadcasters compress every human-readable string with a
//! per-country prefix code. [`Dictionary`] holds the decoding tree.

mod dictionary;

pub use dictionary::{Dictionary, Symbol};

#[cfg(test)]
pub(crate) use dictionary::testutil;
