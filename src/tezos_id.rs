/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Base58check encoding of Tezos identifiers.
//!
//! Every human-readable identifier is `base58(prefix ++ payload ++ checksum)`,
//! where the checksum is the first four bytes of a double SHA-256 of
//! `prefix ++ payload`. The prefix is chosen so that the text form starts with
//! a recognizable tag (`tz1`, `KT1`, `edpk`, ...). [TezosIdKind] lists known
//! kinds together with their prefixes and payload sizes.

use base58::{FromBase58, ToBase58};
use cryptoxide::blake2b::Blake2b;
use cryptoxide::digest::Digest;
use cryptoxide::hashing::sha256;
use strum_macros::{Display, EnumIter};

const CHECKSUM_BYTE_SIZE: usize = 4;

/// Errors possible when decoding base58check-encoded identifiers.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum Base58Error {
    /// Input contains characters outside of the base58 alphabet.
    #[error("invalid base58")]
    InvalidBase58,
    /// Decoded data is too short to contain a checksum.
    #[error("missing checksum")]
    MissingChecksum,
    /// Checksum doesn't match the data.
    #[error("invalid checksum")]
    InvalidChecksum,
    /// None of the candidate kinds matched the prefix.
    #[error("unknown prefix for {0}")]
    UnknownPrefix(String),
    /// Payload has a size unexpected for the kind.
    #[error("wrong payload length for {kind}: expected {expected}, got {actual}")]
    WrongLength {
        kind: TezosIdKind,
        expected: usize,
        actual: usize,
    },
}

/// Kinds of base58check identifiers.
///
/// Prefix bytes follow `lib_crypto/base58.ml`; the comment on each variant is
/// the resulting textual prefix and the encoded length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum TezosIdKind {
    // B(51)
    BlockHash,
    // o(51)
    OperationHash,
    // P(51)
    ProtocolHash,
    // Co(52)
    ContextHash,
    // tz1(36)
    Ed25519PublicKeyHash,
    // tz2(36)
    Secp256k1PublicKeyHash,
    // tz3(36)
    P256PublicKeyHash,
    // tz4(36)
    Bls12381PublicKeyHash,
    // KT1(36)
    ContractHash,
    // sr1(36)
    SmartRollupHash,
    // edpk(54)
    Ed25519PublicKey,
    // sppk(55)
    Secp256k1PublicKey,
    // p2pk(55)
    P256PublicKey,
    // BLpk(76)
    Bls12381PublicKey,
    // edsig(99)
    Ed25519Signature,
    // spsig1(99)
    Secp256k1Signature,
    // p2sig(98)
    P256Signature,
    // sig(96)
    GenericSignature,
    // BLsig(142)
    Bls12381Signature,
    // Net(15)
    ChainId,
    // expr(54)
    ScriptExprHash,
}

impl TezosIdKind {
    /// Binary prefix prepended to the payload before base58 encoding.
    pub const fn prefix(self) -> &'static [u8] {
        use TezosIdKind::*;
        match self {
            BlockHash => &[1, 52],
            OperationHash => &[5, 116],
            ProtocolHash => &[2, 170],
            ContextHash => &[79, 199],
            Ed25519PublicKeyHash => &[6, 161, 159],
            Secp256k1PublicKeyHash => &[6, 161, 161],
            P256PublicKeyHash => &[6, 161, 164],
            Bls12381PublicKeyHash => &[6, 161, 166],
            ContractHash => &[2, 90, 121],
            SmartRollupHash => &[6, 124, 117],
            Ed25519PublicKey => &[13, 15, 37, 217],
            Secp256k1PublicKey => &[3, 254, 226, 86],
            P256PublicKey => &[3, 178, 139, 127],
            Bls12381PublicKey => &[6, 149, 135, 204],
            Ed25519Signature => &[9, 245, 205, 134, 18],
            Secp256k1Signature => &[13, 115, 101, 19, 63],
            P256Signature => &[54, 240, 44, 52],
            GenericSignature => &[4, 130, 43],
            Bls12381Signature => &[40, 171, 64, 207],
            ChainId => &[87, 82, 0],
            ScriptExprHash => &[13, 44, 64, 27],
        }
    }

    /// Size of the payload in bytes.
    pub const fn payload_len(self) -> usize {
        use TezosIdKind::*;
        match self {
            ChainId => 4,
            Ed25519PublicKeyHash
            | Secp256k1PublicKeyHash
            | P256PublicKeyHash
            | Bls12381PublicKeyHash
            | ContractHash
            | SmartRollupHash => 20,
            BlockHash | OperationHash | ProtocolHash | ContextHash | Ed25519PublicKey
            | ScriptExprHash => 32,
            Secp256k1PublicKey | P256PublicKey => 33,
            Bls12381PublicKey => 48,
            Ed25519Signature | Secp256k1Signature | P256Signature | GenericSignature => 64,
            Bls12381Signature => 96,
        }
    }
}

/// Blake2b digest of `N` bytes. `N` must be between 16 and 64.
pub fn blake2b_digest<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut hasher = Blake2b::new(N);
    hasher.input(data);
    let mut output = [0u8; N];
    hasher.result(&mut output);
    output
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_BYTE_SIZE] {
    let digest = sha256(&sha256(data));
    let mut res = [0; CHECKSUM_BYTE_SIZE];
    res.copy_from_slice(&digest[..CHECKSUM_BYTE_SIZE]);
    res
}

/// Encode raw bytes with a base58check checksum.
pub fn to_base58_check(data: &[u8]) -> String {
    let mut payload = Vec::with_capacity(data.len() + CHECKSUM_BYTE_SIZE);
    payload.extend_from_slice(data);
    payload.extend_from_slice(&checksum(data));
    payload.to_base58()
}

/// Decode a base58check string, verifying and stripping the checksum.
pub fn from_base58_check(s: &str) -> Result<Vec<u8>, Base58Error> {
    let mut bytes = s.from_base58().map_err(|_| Base58Error::InvalidBase58)?;
    if bytes.len() < CHECKSUM_BYTE_SIZE {
        return Err(Base58Error::MissingChecksum);
    }
    let data_len = bytes.len() - CHECKSUM_BYTE_SIZE;
    if checksum(&bytes[..data_len]) != bytes[data_len..] {
        return Err(Base58Error::InvalidChecksum);
    }
    bytes.truncate(data_len);
    Ok(bytes)
}

/// Encode a payload of the given kind.
pub fn encode_tezos_id(kind: TezosIdKind, payload: &[u8]) -> Result<String, Base58Error> {
    if payload.len() != kind.payload_len() {
        return Err(Base58Error::WrongLength {
            kind,
            expected: kind.payload_len(),
            actual: payload.len(),
        });
    }
    let mut data = Vec::with_capacity(kind.prefix().len() + payload.len());
    data.extend_from_slice(kind.prefix());
    data.extend_from_slice(payload);
    Ok(to_base58_check(&data))
}

/// Decode an identifier trying `candidates` in order. The first kind whose
/// prefix and total length both match wins.
pub fn decode_tezos_id(
    s: &str,
    candidates: &[TezosIdKind],
) -> Result<(TezosIdKind, Vec<u8>), Base58Error> {
    let data = from_base58_check(s)?;
    for &kind in candidates {
        let prefix = kind.prefix();
        if data.len() == prefix.len() + kind.payload_len() && data.starts_with(prefix) {
            return Ok((kind, data[prefix.len()..].to_vec()));
        }
    }
    Err(Base58Error::UnknownPrefix(s.to_owned()))
}

/// Like [decode_tezos_id], for a single expected kind.
pub fn decode_tezos_id_of(s: &str, kind: TezosIdKind) -> Result<Vec<u8>, Base58Error> {
    decode_tezos_id(s, &[kind]).map(|(_, payload)| payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    #[test]
    fn base58_check_known_vector() {
        assert_eq!(
            to_base58_check(&hex::decode("8eceda2f").unwrap()),
            "QtRAcc9FSRg"
        );
        assert_eq!(
            from_base58_check("QtRAcc9FSRg").unwrap(),
            hex::decode("8eceda2f").unwrap()
        );
    }

    #[test]
    fn decode_key_hash() {
        let (kind, payload) = decode_tezos_id(
            "tz1Nw5nr152qddEjKT2dKBH8XcBMDAg72iLw",
            &[
                TezosIdKind::Ed25519PublicKeyHash,
                TezosIdKind::Secp256k1PublicKeyHash,
            ],
        )
        .unwrap();
        assert_eq!(kind, TezosIdKind::Ed25519PublicKeyHash);
        assert_eq!(
            hex::encode(payload),
            "2422090f872dfd3a39471bb23f180e6dfed030f3"
        );
    }

    #[test]
    fn candidate_order_matters() {
        assert_eq!(
            decode_tezos_id(
                "KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye",
                &[TezosIdKind::Ed25519PublicKeyHash]
            ),
            Err(Base58Error::UnknownPrefix(
                "KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye".to_owned()
            ))
        );
        assert!(decode_tezos_id(
            "KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye",
            &[TezosIdKind::Ed25519PublicKeyHash, TezosIdKind::ContractHash]
        )
        .is_ok());
    }

    #[test]
    fn errors() {
        assert_eq!(from_base58_check("0OIl"), Err(Base58Error::InvalidBase58));
        assert_eq!(from_base58_check("1"), Err(Base58Error::MissingChecksum));
        assert_eq!(
            from_base58_check("tz1Nw5nr152qddEjKT2dKBH8XcBMDAg72iLx"),
            Err(Base58Error::InvalidChecksum)
        );
        assert_eq!(
            encode_tezos_id(TezosIdKind::ChainId, &[1, 2, 3]),
            Err(Base58Error::WrongLength {
                kind: TezosIdKind::ChainId,
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn blake2b_empty() {
        assert_eq!(
            hex::encode(blake2b_digest::<32>(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn chain_id_text() {
        let s = encode_tezos_id(TezosIdKind::ChainId, &hex::decode("7a06a770").unwrap()).unwrap();
        assert_eq!(s, "NetXdQprcVkpaWU");
    }

    proptest! {
        #[test]
        fn round_trip(kind_ix in 0usize..21, seed in proptest::collection::vec(any::<u8>(), 96)) {
            let kind = TezosIdKind::iter().nth(kind_ix).unwrap();
            let payload = &seed[..kind.payload_len()];
            let encoded = encode_tezos_id(kind, payload).unwrap();
            prop_assert_eq!(decode_tezos_id_of(&encoded, kind).unwrap(), payload.to_vec());
        }

        #[test]
        fn bit_flip_is_detected(
            payload in proptest::collection::vec(any::<u8>(), 20),
            byte_ix in 0usize..27,
            bit in 0u8..8,
        ) {
            let kind = TezosIdKind::Ed25519PublicKeyHash;
            let mut data = kind.prefix().to_vec();
            data.extend_from_slice(&payload);
            let mut raw = data.clone();
            raw.extend_from_slice(&checksum(&data));
            raw[byte_ix] ^= 1 << bit;
            prop_assert!(decode_tezos_id_of(&raw.to_base58(), kind).is_err());
        }
    }
}
