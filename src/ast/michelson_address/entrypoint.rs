/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Entrypoint names, the part after `%` in
//! `KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye%foo`.

use crate::ast::byte_repr_trait::ByteReprError;

/// Entrypoint name: an ASCII string of at most 31 characters.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash)]
pub struct Entrypoint(String);

/// The default entrypoint is stored as the literal "default", because it
/// affects comparison for addresses.
pub const DEFAULT_EP_NAME: &str = "default";
pub const MAX_EP_LEN: usize = 31;

impl std::fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Entrypoint {
    fn default() -> Self {
        Entrypoint(DEFAULT_EP_NAME.to_owned())
    }
}

impl Entrypoint {
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_EP_NAME
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<&str> for Entrypoint {
    type Error = ByteReprError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.is_empty() {
            Ok(Entrypoint::default())
        } else {
            check_ep_name(s.as_bytes())?;
            Ok(Entrypoint(s.to_owned()))
        }
    }
}

impl TryFrom<&[u8]> for Entrypoint {
    type Error = ByteReprError;
    fn try_from(s: &[u8]) -> Result<Self, ByteReprError> {
        if s.is_empty() {
            return Ok(Entrypoint::default());
        }
        check_ep_name(s)?;
        let ep = Entrypoint(String::from_utf8_lossy(s).into_owned());
        if ep.is_default() {
            return Err(ByteReprError::WrongFormat(
                "explicit default entrypoint is forbidden in binary encoding".to_owned(),
            ));
        }
        Ok(ep)
    }
}

/// Check the name against `[_0-9a-zA-Z][_0-9a-zA-Z.%@]*` and the length
/// limit. View names follow the same rule.
pub fn check_ep_name(ep: &[u8]) -> Result<(), ByteReprError> {
    if ep.len() > MAX_EP_LEN {
        return Err(ByteReprError::WrongFormat(format!(
            "entrypoint name must be at most {} characters long, but it is {} characters long",
            MAX_EP_LEN,
            ep.len()
        )));
    }
    for (i, c) in ep.iter().enumerate() {
        match c {
            b'_' | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' => Ok(()),
            b'.' | b'%' | b'@' if i > 0 => Ok(()),
            c => Err(ByteReprError::WrongFormat(format!(
                "forbidden byte in entrypoint name: {}",
                hex::encode([*c])
            ))),
        }?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(Entrypoint::try_from(""), Ok(Entrypoint::default()));
        assert_eq!(Entrypoint::try_from("default"), Ok(Entrypoint::default()));
        assert_eq!(
            Entrypoint::try_from("foo.bar"),
            Ok(Entrypoint("foo.bar".to_owned()))
        );
        assert_eq!(
            Entrypoint::try_from("q".repeat(31).as_str()),
            Ok(Entrypoint("q".repeat(31)))
        );
        assert!(matches!(
            Entrypoint::try_from("q".repeat(32).as_str()),
            Err(ByteReprError::WrongFormat(_))
        ));
        assert!(matches!(
            Entrypoint::try_from("संसर"),
            Err(ByteReprError::WrongFormat(_))
        ));
        assert!(matches!(
            Entrypoint::try_from(".foo"),
            Err(ByteReprError::WrongFormat(_))
        ));
    }

    #[test]
    fn test_from_bytes() {
        assert!(matches!(
            Entrypoint::try_from(b"default" as &[u8]),
            Err(ByteReprError::WrongFormat(_))
        ));
        assert_eq!(
            Entrypoint::try_from(b"" as &[u8]),
            Ok(Entrypoint::default())
        );
        assert_eq!(
            Entrypoint::try_from(b"foo" as &[u8]),
            Ok(Entrypoint("foo".to_owned()))
        );
    }
}
