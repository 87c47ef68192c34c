/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Michelson `address` values: an account hash plus an optional entrypoint.
//!
//! The text form is `<base58 hash>[%entrypoint]`. The binary form is the
//! fixed-width [AddressHash] encoding followed by the raw entrypoint name,
//! which is left out for the default entrypoint.

pub mod address_hash;
pub mod entrypoint;

pub use self::address_hash::AddressHash;
pub use self::entrypoint::Entrypoint;

use super::byte_repr_trait::{ByteReprError, ByteReprTrait};

#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub struct Address {
    pub hash: AddressHash,
    pub entrypoint: Entrypoint,
}

impl Address {
    pub fn is_default_ep(&self) -> bool {
        self.entrypoint.is_default()
    }
}

impl ByteReprTrait for Address {
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError> {
        // `tz1...%` names the default entrypoint, same as no suffix
        let (hash, ep) = data.split_once('%').unwrap_or((data, ""));
        Ok(Address {
            hash: AddressHash::from_base58_check(hash)?,
            entrypoint: Entrypoint::try_from(ep)?,
        })
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError> {
        let Some(ep) = bytes.get(AddressHash::BYTE_SIZE..) else {
            return Err(ByteReprError::WrongFormat(format!(
                "address needs at least {} bytes, got {}",
                AddressHash::BYTE_SIZE,
                bytes.len()
            )));
        };
        Ok(Address {
            hash: AddressHash::from_bytes(&bytes[..AddressHash::BYTE_SIZE])?,
            entrypoint: Entrypoint::try_from(ep)?,
        })
    }

    fn to_bytes(&self, out: &mut Vec<u8>) {
        self.hash.to_bytes(out);
        if !self.is_default_ep() {
            out.extend_from_slice(self.entrypoint.as_bytes())
        }
    }

    fn to_base58_check(&self) -> String {
        let hash = self.hash.to_base58_check();
        if self.is_default_ep() {
            hash
        } else {
            format!("{hash}%{}", self.entrypoint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // binary forms as produced by `octez-client run script` on a contract
    // that fails with its `address` parameter
    const FIXTURES: &[(&str, &str)] = &[
        (
            "tz1Nw5nr152qddEjKT2dKBH8XcBMDAg72iLw",
            "00002422090f872dfd3a39471bb23f180e6dfed030f3",
        ),
        (
            "tz1WrbkDrzKVqcGXkjw4Qk4fXkjXpAJuNP1j%bar",
            "00007b09f782e0bcd67739510afa819d85976119d5ef626172",
        ),
        (
            "tz1WrbkDrzKVqcGXkjw4Qk4fXkjXpAJuNP1j%defauls",
            "00007b09f782e0bcd67739510afa819d85976119d5ef64656661756c73",
        ),
        (
            "tz29EDhZ4D3XueHxm5RGZsJLHRtj3qSA2MzH%foo",
            "00010a053e3d8b622a993d3182e3f6cc5638ff5f12fe666f6f",
        ),
        (
            "tz3UoffC7FG7zfpmvmjUmUeAaHvzdcUvAj6r",
            "00025cfa532f50de3e12befc0ad21603835dd7698d35",
        ),
        (
            "tz4J46gb6DxDFYxkex8k9sKiYZwjuiaoNSqN%bar",
            "00036342f30484dd46b6074373aa6ddca9dfb70083d6626172",
        ),
        (
            "KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye",
            "011f2d825fdd9da219235510335e558520235f4f5400",
        ),
        (
            "KT1RvkwF4F7pz1gCoxkyZrG1RkrxQy3gmFTv%foo",
            "01be41ee922ddd2cf33201e49d32da0afec571dce300666f6f",
        ),
        (
            "sr1RYurGZtN8KNSpkMcCt9CgWeUaNkzsAfXf%foo",
            "03d601f22256d2ad1faec0c64374e527c6e62f2e5a00666f6f",
        ),
    ];

    #[test]
    fn text_and_binary_agree() {
        for (b58, hex_bytes) in FIXTURES {
            let bytes = hex::decode(hex_bytes).unwrap();
            let from_text = Address::from_base58_check(b58).unwrap();
            assert_eq!(from_text.to_bytes_vec(), bytes, "{b58}");
            assert_eq!(Address::from_bytes(&bytes).unwrap(), from_text, "{b58}");
            assert_eq!(from_text.to_base58_check(), *b58);
        }
    }

    #[test]
    fn default_entrypoint_spellings() {
        let plain = Address::from_base58_check("tz1Nw5nr152qddEjKT2dKBH8XcBMDAg72iLw").unwrap();
        for spelled in ["%", "%default"] {
            let addr = Address::from_base58_check(&format!(
                "tz1Nw5nr152qddEjKT2dKBH8XcBMDAg72iLw{spelled}"
            ))
            .unwrap();
            assert!(addr.is_default_ep());
            assert_eq!(addr, plain);
        }
    }

    #[test]
    fn malformed_bytes() {
        let wrong_format = |hex_bytes: &str| {
            matches!(
                Address::from_bytes(&hex::decode(hex_bytes).unwrap()),
                Err(ByteReprError::WrongFormat(_))
            )
        };
        // explicit `default` suffix
        assert!(wrong_format(
            "00007b09f782e0bcd67739510afa819d85976119d5ef64656661756c74"
        ));
        // KT1 padding byte must be zero
        assert!(wrong_format("011f2d825fdd9da219235510335e558520235f4f5401"));
        // shorter than an address hash
        assert!(wrong_format("011f2d825fdd9da2"));
        for unknown in [
            "00ff7b09f782e0bcd67739510afa819d85976119d5ef",
            "ffff7b09f782e0bcd67739510afa819d85976119d5ef",
        ] {
            assert_eq!(
                Address::from_bytes(&hex::decode(unknown).unwrap()),
                Err(ByteReprError::UnknownPrefix("0xff".to_owned()))
            );
        }
    }

    #[test]
    fn malformed_text() {
        assert!(Address::from_base58_check("KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye%a b").is_err());
        assert!(Address::from_base58_check("tz1Nw5nr152qddEjKT2dKBH8XcBMDAg72iLx").is_err());
        assert!(Address::from_base58_check("").is_err());
    }
}
