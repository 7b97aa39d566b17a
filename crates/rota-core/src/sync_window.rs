//! Rolling `[start, end)` window of events that are due for channel management.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowConfigError {
    #[error("anchor weekday must be -1 (disabled) or 0..=6 (Sunday..Saturday), got {0}")]
    AnchorWeekdayOutOfRange(i64),
    #[error("lookahead must be positive, got {0} seconds")]
    NonPositiveLookahead(i64),
    #[error("lookahead of {0} hours exceeds the {max} hour maximum", max = MAX_LOOKAHEAD_HOURS)]
    LookaheadTooLarge(i64),
}

/// Longest accepted lookahead: ten years.
pub const MAX_LOOKAHEAD_HOURS: i64 = 24 * 3_660;

/// Converts a configured lookahead in hours, rejecting values that are not
/// positive or too large to add to a timestamp.
pub fn lookahead_from_hours(hours: i64) -> Result<Duration, WindowConfigError> {
    if hours <= 0 {
        return Err(WindowConfigError::NonPositiveLookahead(
            hours.saturating_mul(3_600),
        ));
    }
    if hours > MAX_LOOKAHEAD_HOURS {
        return Err(WindowConfigError::LookaheadTooLarge(hours));
    }
    Duration::try_hours(hours).ok_or(WindowConfigError::LookaheadTooLarge(hours))
}

/// Weekday the window start is pinned to, counted from Sunday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorWeekday(u32);

impl AnchorWeekday {
    pub fn new(days_from_sunday: u32) -> Result<Self, WindowConfigError> {
        if days_from_sunday > 6 {
            return Err(WindowConfigError::AnchorWeekdayOutOfRange(i64::from(
                days_from_sunday,
            )));
        }
        Ok(Self(days_from_sunday))
    }

    /// Maps the configured integer: any negative value disables anchoring.
    pub fn from_config(value: i64) -> Result<Option<Self>, WindowConfigError> {
        if value < 0 {
            return Ok(None);
        }
        let days = u32::try_from(value)
            .map_err(|_| WindowConfigError::AnchorWeekdayOutOfRange(value))?;
        Self::new(days)
            .map(Some)
            .map_err(|_| WindowConfigError::AnchorWeekdayOutOfRange(value))
    }

    pub fn days_from_sunday(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Computes the window for `now`. When anchored, the start walks back to
    /// the most recent anchor weekday (today included), keeping the time of day.
    pub fn compute(now: DateTime<Utc>, lookahead: Duration, anchor: Option<AnchorWeekday>) -> Self {
        let start = match anchor {
            None => now,
            Some(anchor) => {
                let today = now.weekday().num_days_from_sunday();
                let days_back = (i64::from(today) - i64::from(anchor.days_from_sunday()))
                    .rem_euclid(7);
                now - Duration::days(days_back)
            }
        };
        // Saturates instead of overflowing for lookaheads built outside `lookahead_from_hours`.
        let end = start
            .checked_add_signed(lookahead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    /// True when `instant` lies in `[start, end)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True when `instant` precedes the window start.
    pub fn has_passed(&self, instant: DateTime<Utc>) -> bool {
        instant < self.start
    }
}
