/******************************************************************************/
/*                                                                            */
/* SPDX-License-Identifier: MIT                                               */
/* Copyright (c) [2023] Serokell <hi@serokell.io>                             */
/*                                                                            */
/******************************************************************************/

//! Conversions between the two forms of Michelson `timestamp` literals:
//! seconds since the Unix epoch and RFC 3339 strings.

use chrono::{DateTime, Datelike};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

/// Parse an RFC 3339 date, e.g. `2019-09-26T10:59:51Z`, to seconds since the
/// epoch. Sub-second precision is dropped.
pub fn parse_timestamp(s: &str) -> Option<BigInt> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp().into())
}

/// Render seconds since the epoch as `YYYY-MM-DDTHH:MM:SSZ`. Returns [None]
/// when the date falls outside of years 0 to 9999, such timestamps are only
/// representable as numbers.
pub fn format_timestamp(secs: &BigInt) -> Option<String> {
    let dt = DateTime::from_timestamp(secs.to_i64()?, 0)?;
    if !(0..=9999).contains(&dt.year()) {
        return None;
    }
    Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_ways() {
        assert_eq!(
            parse_timestamp("2019-09-26T10:59:51Z"),
            Some(1569495591.into())
        );
        assert_eq!(
            parse_timestamp("2019-09-26T12:59:51+02:00"),
            Some(1569495591.into())
        );
        assert_eq!(parse_timestamp("1569495591"), None);
        assert_eq!(
            format_timestamp(&1569495591.into()).as_deref(),
            Some("2019-09-26T10:59:51Z")
        );
        assert_eq!(
            format_timestamp(&0.into()).as_deref(),
            Some("1970-01-01T00:00:00Z")
        );
        assert_eq!(format_timestamp(&BigInt::from(i64::MAX)), None);
    }
}
