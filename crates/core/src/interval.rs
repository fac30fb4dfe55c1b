//! Half-open time intervals.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A time range `[start, end)`: includes `start`, excludes `end`.
///
/// Construction guarantees `start < end`, and deserialization goes through
/// the same check. Adjacent intervals never overlap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalRecord", into = "IntervalRecord")]
pub struct TimeInterval {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IntervalRecord {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl TryFrom<IntervalRecord> for TimeInterval {
    type Error = DomainError;

    fn try_from(r: IntervalRecord) -> Result<Self, Self::Error> {
        Self::new(r.start, r.end)
    }
}

impl From<TimeInterval> for IntervalRecord {
    fn from(i: TimeInterval) -> Self {
        Self {
            start: i.start,
            end: i.end,
        }
    }
}

impl ValueObject for TimeInterval {}

impl TimeInterval {
    /// Fails with a validation error unless `end` strictly follows `start`.
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> DomainResult<Self> {
        if end <= start {
            return Err(DomainError::validation(format!(
                "interval end ({end}) must be after its start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// The calendar day `date` as seen from `offset`: `[date 00:00, date+1 00:00)`.
    pub fn day(date: NaiveDate, offset: FixedOffset) -> DomainResult<Self> {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DomainError::validation(format!("date {date} is out of range")))?;
        let start = date
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_local_timezone(offset).single());
        let end = next
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_local_timezone(offset).single());
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(DomainError::validation(format!(
                "date {date} cannot be resolved at offset {offset}"
            ))),
        }
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// `startA < endB && startB < endA`.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `instant` lies in `[start, end)`.
    pub fn contains(&self, instant: DateTime<FixedOffset>) -> bool {
        self.start <= instant && instant < self.end
    }
}
