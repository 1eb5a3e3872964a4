//! Time utilities for alior
//!
//! Provides the [`Clock`] abstraction used by the session store and the
//! status resolver, plus parsing of the date tokens users type into the chat.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ALIOR_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for walking an event through its Scheduled/InProgress/Completed lifecycle
//! by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2030-01-01 10:30:00`)
//!
//! Example:
//! ```bash
//! ALIOR_MOCK_TIME="2030-01-01 10:30:00" aliord
//! ```

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::{AliorError, Result};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ALIOR_MOCK_TIME";

/// Format of a timed event start as typed by the user
pub const DATETIME_TOKEN_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Format of an all-day event date as typed by the user
pub const DATE_TOKEN_FORMAT: &str = "%d.%m.%Y";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of the current time.
///
/// The session store and the status sweeper take a `Clock` so tests can
/// move time forward deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock, honouring `ALIOR_MOCK_TIME` in debug builds
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        now()
    }
}

/// Hand-driven clock for tests
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Local>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse a `dd.mm.yyyy hh:mm` token into a local instant
pub fn parse_datetime_token(input: &str) -> Result<DateTime<Local>> {
    let token = input.trim();
    if token.len() != 16 {
        return Err(AliorError::validation(format!(
            "expected dd.mm.yyyy hh:mm, got '{}'",
            token
        )));
    }

    let naive = NaiveDateTime::parse_from_str(token, DATETIME_TOKEN_FORMAT)
        .map_err(|e| AliorError::validation(format!("invalid date-time '{}': {}", token, e)))?;

    localize(naive)
}

/// Parse a `dd.mm.yyyy` token into the local midnight starting that day
pub fn parse_date_token(input: &str) -> Result<DateTime<Local>> {
    let token = input.trim();
    if token.len() != 10 {
        return Err(AliorError::validation(format!(
            "expected dd.mm.yyyy, got '{}'",
            token
        )));
    }

    let date = NaiveDate::parse_from_str(token, DATE_TOKEN_FORMAT)
        .map_err(|e| AliorError::validation(format!("invalid date '{}': {}", token, e)))?;

    localize(date.and_time(chrono::NaiveTime::MIN))
}

fn localize(naive: NaiveDateTime) -> Result<DateTime<Local>> {
    // Ambiguous wall times (DST fall-back) resolve to the earlier instant.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| {
            AliorError::validation(format!("{} does not exist in the local timezone", naive))
        })
}

/// Format an instant the way users type it
pub fn format_datetime_token(dt: &DateTime<Local>) -> String {
    dt.format(DATETIME_TOKEN_FORMAT).to_string()
}

/// Format a date the way users type it
pub fn format_date_token(dt: &DateTime<Local>) -> String {
    dt.format(DATE_TOKEN_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_datetime_token() {
        let dt = parse_datetime_token("01.01.2030 10:00").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_token_trims_whitespace() {
        let dt = parse_datetime_token("  31.12.2030 23:59 ").unwrap();
        assert_eq!(dt.day(), 31);
        assert_eq!(dt.minute(), 59);
    }

    #[test]
    fn test_parse_datetime_token_rejects_other_shapes() {
        let invalid = [
            "",
            "01.01.2030",
            "1.1.2030 10:00",
            "2030-01-01 10:00",
            "01.01.2030T10:00",
            "32.01.2030 10:00",
            "01.13.2030 10:00",
            "01.01.2030 24:00",
            "01.01.2030 10:00:00",
            "tomorrow morning",
        ];

        for input in &invalid {
            assert!(
                parse_datetime_token(input).is_err(),
                "Expected '{}' to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_parse_date_token() {
        let dt = parse_date_token("05.05.2031").unwrap();
        assert_eq!(dt, Local.with_ymd_and_hms(2031, 5, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_date_token_rejects_time() {
        assert!(parse_date_token("05.05.2031 10:00").is_err());
        assert!(parse_date_token("5.5.2031").is_err());
        assert!(parse_date_token("29.02.2031").is_err());
    }

    #[test]
    fn test_format_tokens() {
        let dt = Local.with_ymd_and_hms(2030, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(format_datetime_token(&dt), "07.03.2030 09:05");
        assert_eq!(format_date_token(&dt), "07.03.2030");
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Local.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_returns_time() {
        let t = SystemClock.now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "ALIOR_MOCK_TIME");
    }
}
