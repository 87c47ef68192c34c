/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Protocol versions the toolchain knows how to gate behaviour on.
//!
//! Protocols are totally ordered by activation, so gating is a plain
//! comparison, see [Protocol::is_at_least].

use strum_macros::{Display, EnumIter, EnumString};

/// Tezos economic protocol, identified by its name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    Babylon,
    Carthage,
    Delphi,
    Edo,
    Florence,
    Granada,
    Hangzhou,
    Ithaca,
    Jakarta,
    Kathmandu,
    Lima,
    Mumbai,
    Nairobi,
    Oxford,
    Paris,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::LATEST
    }
}

impl Protocol {
    /// Newest protocol known to the toolchain.
    pub const LATEST: Protocol = Protocol::Paris;

    /// `true` when `self` was activated no earlier than `other`.
    pub fn is_at_least(self, other: Protocol) -> bool {
        self >= other
    }

    /// Native `DUP n`, `UNPAIR`, `PAIR n`, `GET n` and `UPDATE n`.
    pub fn has_comb_instructions(self) -> bool {
        self.is_at_least(Protocol::Edo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ordering() {
        assert!(Protocol::Edo.is_at_least(Protocol::Delphi));
        assert!(Protocol::Edo.is_at_least(Protocol::Edo));
        assert!(!Protocol::Delphi.is_at_least(Protocol::Edo));
        assert!(Protocol::LATEST.has_comb_instructions());
        assert!(!Protocol::Carthage.has_comb_instructions());
    }

    #[test]
    fn from_name() {
        assert_eq!(Protocol::from_str("edo"), Ok(Protocol::Edo));
        assert_eq!(Protocol::from_str("Paris"), Ok(Protocol::Paris));
        assert!(Protocol::from_str("ghost").is_err());
    }
}
