/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Micheline syntax tree and typed chain literals.

pub mod annotations;
pub mod byte_repr_trait;
pub mod chain_id;
pub mod micheline;
pub mod michelson_address;
pub mod michelson_key;
pub mod michelson_key_hash;
pub mod michelson_signature;
pub mod michelson_type;
pub mod provenance;
pub mod timestamp;

pub use annotations::{Annotations, NO_ANNS};
pub use byte_repr_trait::{ByteReprError, ByteReprTrait};
pub use chain_id::ChainId;
pub use micheline::Micheline;
pub use michelson_address::{Address, AddressHash, Entrypoint};
pub use michelson_key::Key;
pub use michelson_key_hash::KeyHash;
pub use michelson_signature::Signature;
pub use michelson_type::{Ty, Type, TypeAnns};
pub use provenance::{NodeId, Origin, Provenance};
