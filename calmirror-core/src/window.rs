//! Sync window: the half-open instant interval a cycle mirrors.

use chrono::{DateTime, Duration, Utc};

use crate::constants::{DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBACK_DAYS};
use crate::error::{MirrorError, MirrorResult};

/// Half-open interval `[start, end)` of absolute instants. Recurrence
/// expansion and overlap filtering are always evaluated against this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Default for SyncWindow {
    /// Default window: now minus lookback, now plus lookahead.
    fn default() -> Self {
        SyncWindow::around_now(
            Duration::days(DEFAULT_LOOKBACK_DAYS),
            Duration::days(DEFAULT_LOOKAHEAD_DAYS),
        )
    }
}

impl SyncWindow {
    /// Window computed fresh from "now" plus configured offsets.
    pub fn around_now(lookback: Duration, lookahead: Duration) -> Self {
        let now = Utc::now();
        SyncWindow {
            start: now - lookback,
            end: now + lookahead,
        }
    }

    /// Explicit bounds. Fatal if the interval is empty or inverted;
    /// a cycle cannot proceed without a valid window.
    pub fn from_bounds(start: DateTime<Utc>, end: DateTime<Utc>) -> MirrorResult<Self> {
        if end <= start {
            return Err(MirrorError::Window(format!(
                "window end {} is not after start {}",
                end, start
            )));
        }
        Ok(SyncWindow { start, end })
    }

    /// Half-open overlap: an interval touching only a boundary is excluded,
    /// so adjacent non-overlapping events never match.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end > self.start && start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_overlap_boundaries_are_exclusive() {
        let window = SyncWindow::from_bounds(utc(2026, 3, 1, 0), utc(2026, 3, 8, 0)).unwrap();

        // Ends exactly at window start: excluded
        assert!(!window.overlaps(utc(2026, 2, 28, 12), utc(2026, 3, 1, 0)));
        // Starts exactly at window end: excluded
        assert!(!window.overlaps(utc(2026, 3, 8, 0), utc(2026, 3, 8, 1)));
        // Straddles the start boundary: included
        assert!(window.overlaps(utc(2026, 2, 28, 23), utc(2026, 3, 1, 1)));
        // Straddles the end boundary: included
        assert!(window.overlaps(utc(2026, 3, 7, 23), utc(2026, 3, 8, 1)));
        // Fully inside: included
        assert!(window.overlaps(utc(2026, 3, 3, 10), utc(2026, 3, 3, 11)));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = SyncWindow::from_bounds(utc(2026, 3, 8, 0), utc(2026, 3, 1, 0)).unwrap_err();
        assert!(matches!(err, MirrorError::Window(_)));
    }
}
