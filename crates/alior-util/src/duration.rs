//! Compact duration tokens: `1d2h30m`, `2h`, `45m`
//!
//! Components are days, hours and minutes, each an unsigned integer followed
//! by its unit letter, in that order and at most once each. Whitespace is
//! allowed between components so formatted output parses back.

use std::time::Duration;
use thiserror::Error;

use crate::AliorError;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Duration token format errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("duration is empty")]
    Empty,

    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("unit '{0}' has no number before it")]
    MissingNumber(char),

    #[error("number at the end has no unit")]
    MissingUnit,

    #[error("unit '{0}' is repeated or out of d/h/m order")]
    OutOfOrder(char),

    #[error("duration is too large")]
    Overflow,
}

impl From<DurationError> for AliorError {
    fn from(e: DurationError) -> Self {
        AliorError::validation(e.to_string())
    }
}

fn unit_rank(unit: char) -> Option<(u8, u64)> {
    match unit {
        'd' => Some((0, SECS_PER_DAY)),
        'h' => Some((1, SECS_PER_HOUR)),
        'm' => Some((2, SECS_PER_MINUTE)),
        _ => None,
    }
}

/// Parse a duration token such as `1d2h30m`
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let token = input.trim();
    if token.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut total: u64 = 0;
    let mut number: Option<u64> = None;
    let mut last_rank: Option<u8> = None;

    for (position, c) in token.chars().enumerate() {
        if let Some(digit) = c.to_digit(10) {
            let current = number.unwrap_or(0);
            number = Some(
                current
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit as u64))
                    .ok_or(DurationError::Overflow)?,
            );
            continue;
        }

        if c.is_ascii_whitespace() {
            if number.is_some() {
                // "1 d": a separator may only sit between whole components
                return Err(DurationError::MissingUnit);
            }
            continue;
        }

        let (rank, unit_secs) =
            unit_rank(c).ok_or(DurationError::UnexpectedChar { found: c, position })?;
        let value = number.take().ok_or(DurationError::MissingNumber(c))?;

        if last_rank.is_some_and(|last| rank <= last) {
            return Err(DurationError::OutOfOrder(c));
        }
        last_rank = Some(rank);

        total = value
            .checked_mul(unit_secs)
            .and_then(|secs| total.checked_add(secs))
            .ok_or(DurationError::Overflow)?;
    }

    if number.is_some() {
        return Err(DurationError::MissingUnit);
    }

    Ok(Duration::from_secs(total))
}

/// Format a duration as its non-zero components, e.g. `1d 2h 30m`.
///
/// Sub-minute remainders are dropped; a zero duration formats as `""`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let days = secs / SECS_PER_DAY;
    let hours = (secs % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn test_parse_components() {
        assert_eq!(parse_duration("1d2h30m").unwrap(), mins(24 * 60 + 150));
        assert_eq!(parse_duration("2h").unwrap(), mins(120));
        assert_eq!(parse_duration("45m").unwrap(), mins(45));
        assert_eq!(parse_duration("3d").unwrap(), mins(3 * 24 * 60));
        assert_eq!(parse_duration("1d30m").unwrap(), mins(24 * 60 + 30));
        assert_eq!(parse_duration("0m").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_allows_spaces_between_components() {
        assert_eq!(parse_duration("1d 2h 30m").unwrap(), parse_duration("1d2h30m").unwrap());
        assert_eq!(parse_duration(" 1h ").unwrap(), mins(60));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert_eq!(parse_duration("   "), Err(DurationError::Empty));
        assert_eq!(parse_duration("abc"), Err(DurationError::UnexpectedChar { found: 'a', position: 0 }));
        assert_eq!(parse_duration("h"), Err(DurationError::MissingNumber('h')));
        assert_eq!(parse_duration("10"), Err(DurationError::MissingUnit));
        assert_eq!(parse_duration("1h2"), Err(DurationError::MissingUnit));
        assert_eq!(parse_duration("1 h"), Err(DurationError::MissingUnit));
        assert_eq!(parse_duration("30m2h"), Err(DurationError::OutOfOrder('h')));
        assert_eq!(parse_duration("1h1h"), Err(DurationError::OutOfOrder('h')));
        assert_eq!(parse_duration("1h30mx"), Err(DurationError::UnexpectedChar { found: 'x', position: 5 }));
        assert_eq!(parse_duration("1.5h"), Err(DurationError::UnexpectedChar { found: '.', position: 1 }));
        assert_eq!(parse_duration("-1h"), Err(DurationError::UnexpectedChar { found: '-', position: 0 }));
    }

    #[test]
    fn test_parse_overflow() {
        assert_eq!(
            parse_duration("99999999999999999999d"),
            Err(DurationError::Overflow)
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(Duration::ZERO), "");
        assert_eq!(format_duration(mins(45)), "45m");
        assert_eq!(format_duration(mins(120)), "2h");
        assert_eq!(format_duration(mins(24 * 60 + 150)), "1d 2h 30m");
        assert_eq!(format_duration(mins(24 * 60 + 30)), "1d 30m");
        assert_eq!(format_duration(Duration::from_secs(59)), "");
    }

    #[test]
    fn test_format_then_parse_is_identity() {
        for m in [1, 59, 60, 61, 1439, 1440, 1441, 2 * 1440 + 61, 10_000, 525_600] {
            let d = mins(m);
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d, "minutes = {}", m);
        }
    }

    #[test]
    fn test_error_converts_to_validation() {
        let err: AliorError = DurationError::Empty.into();
        assert!(matches!(err, AliorError::ValidationError(_)));
    }
}
