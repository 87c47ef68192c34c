/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

use super::byte_repr_trait::{check_size, ByteReprError, ByteReprTrait};
use crate::tezos_id::{decode_tezos_id_of, encode_tezos_id, TezosIdKind};

/// Michelson `chain_id` value, `Net...` in base58-check encoding.
#[derive(Debug, Clone, Copy, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub struct ChainId(pub [u8; ChainId::BYTE_SIZE]);

impl ChainId {
    pub const BYTE_SIZE: usize = 4;
}

impl ByteReprTrait for ChainId {
    fn from_base58_check(data: &str) -> Result<Self, ByteReprError> {
        Self::from_bytes(&decode_tezos_id_of(data, TezosIdKind::ChainId)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ByteReprError> {
        check_size(bytes, Self::BYTE_SIZE, "chain_id", "bytes")?;
        let mut res = [0; Self::BYTE_SIZE];
        res.copy_from_slice(bytes);
        Ok(ChainId(res))
    }

    fn to_base58_check(&self) -> String {
        encode_tezos_id(TezosIdKind::ChainId, &self.0).unwrap_or_default()
    }

    fn to_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet() {
        let id = ChainId::from_base58_check("NetXdQprcVkpaWU").unwrap();
        assert_eq!(id, ChainId([0x7a, 0x06, 0xa7, 0x70]));
        assert_eq!(id.to_base58_check(), "NetXdQprcVkpaWU");
        assert!(matches!(
            ChainId::from_bytes(&[1, 2, 3]),
            Err(ByteReprError::WrongFormat(_))
        ));
    }
}
