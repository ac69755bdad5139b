//! Poll interval parsing.
//!
//! Accepts exactly `<digits><unit>` where unit is one of `ms`, `s`, `m`, `h`.
//! Combined units (`1h30m`), fractions, signs and surrounding whitespace are
//! all rejected.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Input does not match `<digits><ms|s|m|h>`.
    #[error("invalid duration '{0}': expected <number><ms|s|m|h>, e.g. 30s or 5m")]
    InvalidFormat(String),

    /// The value does not fit in 64 bits of milliseconds.
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Parses an interval like `500ms`, `90s`, `5m` or `2h` into milliseconds.
pub fn parse_millis(text: &str) -> Result<u64, DurationError> {
    let invalid = || DurationError::InvalidFormat(text.to_string());

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }

    let factor: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => return Err(invalid()),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| DurationError::Overflow(text.to_string()))?;
    value
        .checked_mul(factor)
        .ok_or_else(|| DurationError::Overflow(text.to_string()))
}

/// Same as [`parse_millis`] but returns a [`Duration`]. Used as a clap value parser.
///
/// A zero interval is rejected: a timer cannot tick every 0ms.
pub fn parse_interval(text: &str) -> Result<Duration, DurationError> {
    match parse_millis(text)? {
        0 => Err(DurationError::InvalidFormat(text.to_string())),
        millis => Ok(Duration::from_millis(millis)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_millis("500ms"), Ok(500));
        assert_eq!(parse_millis("90s"), Ok(90_000));
        assert_eq!(parse_millis("5m"), Ok(300_000));
        assert_eq!(parse_millis("2h"), Ok(7_200_000));
    }

    #[test]
    fn test_zero_and_leading_zeros() {
        assert_eq!(parse_millis("0s"), Ok(0));
        assert_eq!(parse_millis("007m"), Ok(420_000));
    }

    #[test]
    fn test_rejects_malformed() {
        for input in [
            "", "1", "h", "ms", "-5s", "+5s", "1h30m", "1.5s", "5 s", " 5s", "5s ", "5S", "5M",
            "5sec", "5d", "s5",
        ] {
            assert!(
                matches!(parse_millis(input), Err(DurationError::InvalidFormat(_))),
                "expected InvalidFormat for {input:?}"
            );
        }
    }

    #[test]
    fn test_overflow_is_reported() {
        let result = parse_millis("99999999999999999999h");
        assert!(matches!(result, Err(DurationError::Overflow(_))));

        let result = parse_millis("18446744073709551615h");
        assert!(matches!(result, Err(DurationError::Overflow(_))));
    }

    #[test]
    fn test_parse_interval_returns_duration() {
        assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
        assert!(parse_interval("soon").is_err());
        assert!(matches!(parse_interval("0ms"), Err(DurationError::InvalidFormat(_))));
    }

    #[test]
    fn test_error_message_names_input() {
        let err = parse_millis("1h30m").unwrap_err();
        assert!(err.to_string().contains("1h30m"));
    }

    proptest! {
        #[test]
        fn prop_seconds_scale_by_thousand(n in 0u64..1_000_000) {
            prop_assert_eq!(parse_millis(&format!("{n}s")), Ok(n * 1_000));
        }

        #[test]
        fn prop_hours_scale(n in 0u64..100_000) {
            prop_assert_eq!(parse_millis(&format!("{n}h")), Ok(n * 3_600_000));
        }

        #[test]
        fn prop_negative_always_rejected(n in 1u64..1_000_000, unit in "(ms|s|m|h)") {
            let input = format!("-{n}{unit}");
            prop_assert!(parse_millis(&input).is_err());
        }

        #[test]
        fn prop_bare_numbers_rejected(n in 0u64..u64::MAX) {
            prop_assert!(parse_millis(&n.to_string()).is_err());
        }
    }
}
