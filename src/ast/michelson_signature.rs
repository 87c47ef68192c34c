/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

use super::byte_repr_trait::{ByteReprError, ByteReprTrait};
use crate::tezos_id::{decode_tezos_id, encode_tezos_id, TezosIdKind};

/// Michelson `signature` value. The contained bytes are the raw signature.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub enum Signature {
    Ed25519(Vec<u8>),
    Secp256k1(Vec<u8>),
    P256(Vec<u8>),
    Bls(Vec<u8>),
    /// See Note: [Generic signatures]
    Generic(Vec<u8>),
}

/* Note: [Generic signatures]

Signatures' byte representations are not tagged, so when reading a signature
from raw bytes, the only way to determine its type is length, and 3 out of 4
signature variants have the same byte length. Hence a separate variant for a
yet-unknown signature scheme. It has its own base58 prefix, `sig`.
*/

const KINDS: [TezosIdKind; 5] = [
    TezosIdKind::Ed25519Signature,
    TezosIdKind::Secp256k1Signature,
    TezosIdKind::P256Signature,
    TezosIdKind::Bls12381Signature,
    TezosIdKind::GenericSignature,
];

impl Signature {
    /// This is byte-length of `BLsig` variant.
    pub const BLS_BYTE_LENGTH: usize = 96;

    /// This is byte-length of `edsig`, `spsig1`, `p2sig` and `sig` variants.
    pub const GENERIC_BYTE_LENGTH: usize = 64;

    fn kind(&self) -> TezosIdKind {
        match self {
            Signature::Ed25519(_) => TezosIdKind::Ed25519Signature,
            Signature::Secp256k1(_) => TezosIdKind::Secp256k1Signature,
            Signature::P256(_) => TezosIdKind::P256Signature,
            Signature::Bls(_) => TezosIdKind::Bls12381Signature,
            Signature::Generic(_) => TezosIdKind::GenericSignature,
        }
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        match self {
            Signature::Ed25519(s)
            | Signature::Secp256k1(s)
            | Signature::P256(s)
            | Signature::Bls(s)
            | Signature::Generic(s) => s,
        }
    }
}

impl ByteReprTrait for Signature {
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError> {
        let (kind, payload) = decode_tezos_id(data, &KINDS)?;
        Ok(match kind {
            TezosIdKind::Ed25519Signature => Signature::Ed25519(payload),
            TezosIdKind::Secp256k1Signature => Signature::Secp256k1(payload),
            TezosIdKind::P256Signature => Signature::P256(payload),
            TezosIdKind::Bls12381Signature => Signature::Bls(payload),
            _ => Signature::Generic(payload),
        })
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError> {
        match bytes.len() {
            Self::GENERIC_BYTE_LENGTH => Ok(Signature::Generic(bytes.to_vec())),
            Self::BLS_BYTE_LENGTH => Ok(Signature::Bls(bytes.to_vec())),
            len => Err(ByteReprError::WrongFormat(format!(
                "signature must be either {} or {} bytes long, but it is {} bytes long",
                Self::GENERIC_BYTE_LENGTH,
                Self::BLS_BYTE_LENGTH,
                len
            ))),
        }
    }

    fn to_base58_check(&self) -> String {
        encode_tezos_id(self.kind(), self.as_ref()).unwrap_or_default()
    }

    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_ref())
    }
}

impl TryFrom<&str> for Signature {
    type Error = ByteReprError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_base58_check(value)
    }
}
