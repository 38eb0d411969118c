// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The CQL `duration` type: a months/days/nanoseconds triple with the
//! canonical text form used by CQL literals.

use std::{
    fmt::Display,
    str::FromStr,
};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const DAYS_PER_WEEK: i32 = 7;
const MONTHS_PER_YEAR: i32 = 12;

/// A CQL duration. Durations are not totally ordered (a month is not a fixed
/// number of days), so the three components are kept apart. On the wire the
/// triple is encoded as three consecutive signed vints.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CqlDuration {
    pub months: i32,
    pub days: i32,
    pub nanoseconds: i64,
}

impl CqlDuration {
    pub fn new(months: i32, days: i32, nanoseconds: i64) -> Self {
        Self {
            months,
            days,
            nanoseconds,
        }
    }

    /// Whether the text form carries a leading minus: every component is
    /// non-positive and at least one is nonzero.
    pub fn is_negative(&self) -> bool {
        self.months <= 0
            && self.days <= 0
            && self.nanoseconds <= 0
            && (self.months != 0 || self.days != 0 || self.nanoseconds != 0)
    }
}

impl Display for CqlDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (months, days, nanos) = if self.is_negative() {
            write!(f, "-")?;
            (
                self.months.unsigned_abs(),
                self.days.unsigned_abs(),
                self.nanoseconds.unsigned_abs(),
            )
        } else {
            (self.months as u32, self.days as u32, self.nanoseconds as u64)
        };
        let mut empty = true;
        let mut part = |value: u64, unit: &str, f: &mut std::fmt::Formatter<'_>| -> std::fmt::Result {
            if value > 0 {
                empty = false;
                write!(f, "{}{}", value, unit)?;
            }
            Ok(())
        };
        part(months as u64 / MONTHS_PER_YEAR as u64, "y", f)?;
        part(months as u64 % MONTHS_PER_YEAR as u64, "mo", f)?;
        part(days as u64, "d", f)?;
        part(nanos / NANOS_PER_HOUR as u64, "h", f)?;
        part(nanos / NANOS_PER_MINUTE as u64 % 60, "m", f)?;
        part(nanos / NANOS_PER_SECOND as u64 % 60, "s", f)?;
        part(nanos / NANOS_PER_MILLI as u64 % 1_000, "ms", f)?;
        part(nanos / NANOS_PER_MICRO as u64 % 1_000, "us", f)?;
        part(nanos % 1_000, "ns", f)?;
        if empty {
            write!(f, "0s")?;
        }
        Ok(())
    }
}

impl FromStr for CqlDuration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, mut rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        anyhow::ensure!(!rest.is_empty(), "Empty duration");
        let mut months: i64 = 0;
        let mut days: i64 = 0;
        let mut nanos: i64 = 0;
        while !rest.is_empty() {
            let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
            anyhow::ensure!(digits > 0, "Expected a number in duration at: {:?}", rest);
            let value: i64 = rest[..digits].parse()?;
            rest = &rest[digits..];
            let unit = rest
                .chars()
                .take_while(|c| c.is_alphabetic() || *c == 'µ')
                .collect::<String>();
            rest = &rest[unit.len()..];
            match unit.to_ascii_lowercase().as_str() {
                "y" => months += value * MONTHS_PER_YEAR as i64,
                "mo" => months += value,
                "w" => days += value * DAYS_PER_WEEK as i64,
                "d" => days += value,
                "h" => nanos += value * NANOS_PER_HOUR,
                "m" => nanos += value * NANOS_PER_MINUTE,
                "s" => nanos += value * NANOS_PER_SECOND,
                "ms" => nanos += value * NANOS_PER_MILLI,
                "us" | "µs" => nanos += value * NANOS_PER_MICRO,
                "ns" => nanos += value,
                u => anyhow::bail!("Unknown duration unit: {:?}", u),
            }
        }
        let sign = if negative { -1 } else { 1 };
        Ok(CqlDuration {
            months: i32::try_from(months * sign)?,
            days: i32::try_from(days * sign)?,
            nanoseconds: nanos * sign,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trip() {
        let durations = [
            CqlDuration::new(0, 0, 0),
            CqlDuration::new(14, 3, 0),
            CqlDuration::new(0, 0, NANOS_PER_HOUR + 2 * NANOS_PER_MINUTE + 3 * NANOS_PER_SECOND),
            CqlDuration::new(1, 2, 3),
            CqlDuration::new(0, 0, 1_234_567_890),
            CqlDuration::new(-14, -3, -NANOS_PER_SECOND),
            CqlDuration::new(0, -2, 0),
            CqlDuration::new(25, 40, NANOS_PER_HOUR * 30 + 999),
        ];
        for duration in durations {
            let text = duration.to_string();
            let parsed: CqlDuration = text.parse().unwrap();
            assert_eq!(parsed, duration, "{}", text);
        }
    }

    #[test]
    fn canonical_renderings() {
        assert_eq!(CqlDuration::new(14, 0, 0).to_string(), "1y2mo");
        assert_eq!(CqlDuration::new(0, 10, 0).to_string(), "10d");
        assert_eq!(
            CqlDuration::new(0, 0, 90 * NANOS_PER_MINUTE).to_string(),
            "1h30m"
        );
        assert_eq!(CqlDuration::new(-13, 0, 0).to_string(), "-1y1mo");
        assert_eq!(CqlDuration::new(0, 0, 0).to_string(), "0s");
    }

    #[test]
    fn sign_rule() {
        assert!(CqlDuration::new(-1, 0, 0).is_negative());
        assert!(CqlDuration::new(0, -1, -5).is_negative());
        assert!(!CqlDuration::new(0, 0, 0).is_negative());
        assert!(!CqlDuration::new(1, -1, 0).is_negative());
    }

    #[test]
    fn parse_accepts_weeks() {
        let parsed: CqlDuration = "2w1d".parse().unwrap();
        assert_eq!(parsed, CqlDuration::new(0, 15, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("1x".parse::<CqlDuration>().is_err());
        assert!("mo".parse::<CqlDuration>().is_err());
        assert!("".parse::<CqlDuration>().is_err());
    }
}
