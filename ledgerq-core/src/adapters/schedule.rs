//! Scan cadence decisions.
//!
//! Adapters run two independently timed scans: a frequent regular scan over
//! a short window and an infrequent extended scan over a long window. This
//! module keeps the two last-run stamps and turns "what time is it" into
//! "which scan runs now, over which horizon". The arithmetic is pure so the
//! cadence rules can be tested with explicit instants.

use time::OffsetDateTime;

use crate::scanner::ScanHorizon;

/// A scan that is due, as decided by [`ScanSchedule::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueScan {
    /// Horizon the scan should use.
    pub horizon: ScanHorizon,
    /// Whether the regular cadence had lapsed at decision time.
    pub regular_due: bool,
    /// Whether the extended cadence had lapsed at decision time.
    pub extended_due: bool,
}

/// Last-run bookkeeping for the two scan cadences.
#[derive(Debug, Clone)]
pub struct ScanSchedule {
    regular_interval: time::Duration,
    extended_interval: time::Duration,
    last_regular: Option<OffsetDateTime>,
    last_extended: Option<OffsetDateTime>,
}

impl ScanSchedule {
    pub fn new(regular_interval: time::Duration, extended_interval: time::Duration) -> Self {
        Self {
            regular_interval,
            extended_interval,
            last_regular: None,
            last_extended: None,
        }
    }

    /// The scan due at `now`, if any.
    ///
    /// A cadence is due when it has never run or its interval has elapsed.
    /// When the extended cadence is due it takes precedence and the
    /// extended horizon is used; otherwise a due regular scan continues
    /// from the previous regular scan's stamp (or the default short window
    /// when there is none yet).
    pub fn decide(&self, now: OffsetDateTime) -> Option<DueScan> {
        let regular_due = self
            .last_regular
            .is_none_or(|last| now - last > self.regular_interval);
        let extended_due = self
            .last_extended
            .is_none_or(|last| now - last > self.extended_interval);

        if extended_due {
            Some(DueScan {
                horizon: ScanHorizon::Extended,
                regular_due,
                extended_due,
            })
        } else if regular_due {
            let horizon = match self.last_regular {
                Some(last) => ScanHorizon::At(last),
                None => ScanHorizon::Short,
            };
            Some(DueScan {
                horizon,
                regular_due,
                extended_due,
            })
        } else {
            None
        }
    }

    /// Record that a scan ran at `now`, stamping every cadence that was due.
    pub fn mark_ran(&mut self, due: &DueScan, now: OffsetDateTime) {
        if due.regular_due {
            self.last_regular = Some(now);
        }
        if due.extended_due {
            self.last_extended = Some(now);
        }
    }
}
