/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Trait for chain literals that have both a fixed-width binary form and a
//! base58check text form.

use crate::tezos_id::Base58Error;

/// Errors that can happen when working with [ByteReprTrait].
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ByteReprError {
    /// Encountered an unknown prefix while trying to decode a value either from
    /// bytes or base58-check string.
    #[error("unknown prefix: {0}")]
    UnknownPrefix(String),
    /// Input format is in some way unexpected, with the details explained in
    /// the contained string.
    #[error("wrong format: {0}")]
    WrongFormat(String),
}

impl From<Base58Error> for ByteReprError {
    fn from(value: Base58Error) -> Self {
        match value {
            Base58Error::UnknownPrefix(s) => Self::UnknownPrefix(s),
            e => Self::WrongFormat(e.to_string()),
        }
    }
}

/// Trait for values representable by either raw bytes or base58check-derived
/// strings.
pub trait ByteReprTrait: Sized {
    /// Try to construct `Self` from base58-check encoded string slice.
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError>;

    /// Try to construct `Self` from the binary form used by optimized
    /// packing. The slice is _not_ base58-encoded.
    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError>;

    /// Construct base58-check representation of `Self`.
    fn to_base58_check(&self) -> String;

    /// Write the binary form of `Self` to the output vector.
    fn to_bytes(&self, out: &mut Vec<u8>);

    /// Convenience function to construct a new [Vec] and write the binary form
    /// of `Self` to it.
    fn to_bytes_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.to_bytes(&mut out);
        out
    }
}

/// Fail with [ByteReprError::WrongFormat] unless `data` has exactly
/// `expected_size` elements.
pub(crate) fn check_size(
    data: &[u8],
    expected_size: usize,
    what: &str,
    unit: &str,
) -> Result<(), ByteReprError> {
    let size = data.len();
    if size != expected_size {
        Err(ByteReprError::WrongFormat(format!(
            "{what} must be {expected_size} {unit} long, but it is {size} {unit} long"
        )))
    } else {
        Ok(())
    }
}

/// Error for a tag byte not known to the decoder.
pub(crate) fn unknown_tag(tag: u8) -> ByteReprError {
    ByteReprError::UnknownPrefix(format!("0x{}", hex::encode([tag])))
}
