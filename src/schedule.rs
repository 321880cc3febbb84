//! [`TimeSchedule`] (component C) and [`FixedSchedule`] (component D): the
//! two [`Schedule`] implementations the scheduler drives.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;

use crate::bitset::{self, FieldMask, DAY_MASK, HOUR_MASK, MINUTE_MASK, MONTH_MASK, SECOND_MASK, WEEKDAY_MASK};
use crate::error::{CronError, Result};
use crate::parser;

/// Sentinel instant standing in for Go's zero `time.Time`: "no feasible
/// time" from [`Schedule::next`], or "never terminates" from
/// [`Schedule::last`].
pub const NEVER: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// How many calendar years past the starting year `Next` will search before
/// giving up (spec.md §4.C step 5; spec.md §9 open question 2 calls the
/// bound "arbitrary").
pub const DEFAULT_NEXT_HORIZON_YEARS: i32 = 5;

/// A schedule a job can be driven by: `next` finds the next firing instant,
/// `last` reports the terminal instant (`NEVER` if the schedule never
/// terminates).
pub trait Schedule: Send + Sync + fmt::Debug {
    /// Least instant `t' > t` satisfying the schedule, or `NEVER` if none
    /// exists within the schedule's search horizon.
    fn next(&self, after: DateTime<Utc>) -> DateTime<Utc>;

    /// The schedule's terminal instant, or `NEVER` if it never terminates.
    fn last(&self) -> DateTime<Utc> {
        NEVER
    }
}

/// Six bitset fields plus a timezone. Immutable after construction.
#[derive(Debug, Clone)]
pub struct TimeSchedule {
    second: FieldMask,
    minute: FieldMask,
    hour: FieldMask,
    day: FieldMask,
    month: FieldMask,
    weekday: FieldMask,
    timezone: Tz,
    horizon_years: i32,
}

impl TimeSchedule {
    /// Parse a six-field crontab spec, evaluated in `timezone`.
    ///
    /// # Errors
    /// Returns [`CronError::InvalidParameter`] if `spec` isn't a valid
    /// six-field expression.
    pub fn parse(spec: &str, timezone: Tz) -> Result<Self> {
        let [second, minute, hour, day, month, weekday] = parser::parse_fields(spec)?;
        Ok(Self {
            second: second & SECOND_MASK,
            minute: minute & MINUTE_MASK,
            hour: hour & HOUR_MASK,
            day: day & DAY_MASK,
            month: month & MONTH_MASK,
            weekday: weekday & WEEKDAY_MASK,
            timezone,
            horizon_years: DEFAULT_NEXT_HORIZON_YEARS,
        })
    }

    /// Override the default 5-year search horizon (tests use this to make
    /// an infeasible schedule fail fast rather than scanning five years).
    #[must_use]
    pub fn with_horizon_years(mut self, years: i32) -> Self {
        self.horizon_years = years;
        self
    }

    /// Build a singleton schedule matching exactly the fields of `at`
    /// (second, minute, hour, day, month, weekday), in `at`'s timezone.
    /// The Rust analogue of `original_source/schedule.go`'s
    /// `Time2TimeSchedule`, used to test P8 (round-trip coverage).
    pub fn from_instant(at: DateTime<Tz>) -> Self {
        Self {
            second: bitset::set_bit(0, at.second() as u8),
            minute: bitset::set_bit(0, at.minute() as u8),
            hour: bitset::set_bit(0, at.hour() as u8),
            day: bitset::set_bit(0, at.day() as u8),
            month: bitset::set_bit(0, at.month() as u8),
            weekday: bitset::set_bit(0, at.weekday().num_days_from_sunday() as u8),
            timezone: at.timezone(),
            horizon_years: DEFAULT_NEXT_HORIZON_YEARS,
        }
    }

    /// Single step of the coarse-to-fine refine loop (spec.md §4.C step 3).
    /// Returns the updated `(year, month, day, hour, minute, second)` and
    /// whether that tuple is a fully legalized, acceptable instant.
    #[allow(clippy::too_many_arguments)]
    fn refine_step(
        &self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> (i32, u32, u32, u32, u32, u32, bool) {
        // month
        let m = u32::from(bitset::find_next(self.month, month as u8, 12));
        if m > 12 {
            return (year + 1, 1, 1, 0, 0, 0, false);
        }
        let mut day = day;
        let mut hour = hour;
        let mut minute = minute;
        let mut second = second;
        if m != month {
            day = 1;
            hour = 0;
            minute = 0;
            second = 0;
        }
        let month = m;

        // day, coupled with weekday (spec.md §4.C step 4): both must match.
        let mut found_day = None;
        let mut d = day;
        while d < 33 {
            if bitset::is_set(self.day, d as u8) {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, d) {
                    let wd = date.weekday().num_days_from_sunday() as u8;
                    if bitset::is_set(self.weekday, wd) {
                        found_day = Some(d);
                        break;
                    }
                }
            }
            d += 1;
        }
        let Some(d) = found_day else {
            let (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
            return (year, month, 1, 0, 0, 0, false);
        };
        if d != day {
            hour = 0;
            minute = 0;
            second = 0;
        }
        let day = d;

        // hour
        let h = u32::from(bitset::find_next(self.hour, hour as u8, 23));
        if h > 23 {
            return (year, month, day + 1, 0, 0, 0, false);
        }
        if h != hour {
            minute = 0;
            second = 0;
        }
        let hour = h;

        // minute
        let mi = u32::from(bitset::find_next(self.minute, minute as u8, 59));
        if mi > 59 {
            return (year, month, day, hour + 1, 0, 0, false);
        }
        if mi != minute {
            second = 0;
        }
        let minute = mi;

        // second
        let s = u32::from(bitset::find_next(self.second, second as u8, 59));
        if s > 59 {
            return (year, month, day, hour, minute + 1, 0, false);
        }

        (year, month, day, hour, minute, s, true)
    }

    /// Resolve a legalized `(year, month, day, hour, minute, second)` tuple
    /// to an absolute instant in `self.timezone`, advancing by one second
    /// and re-resolving on a DST spring-forward gap (a civil time that
    /// never occurs).
    fn resolve(&self, year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<DateTime<Utc>> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
        match self.timezone.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                Some(dt.with_timezone(&Utc))
            }
            chrono::LocalResult::None => None,
        }
    }
}

impl Schedule for TimeSchedule {
    fn next(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        // snap forward to the next whole second
        let truncated = after - Duration::nanoseconds(i64::from(after.timestamp_subsec_nanos()));
        let snapped = truncated + Duration::seconds(1);

        let zoned = snapped.with_timezone(&self.timezone);
        let start_year = zoned.year();
        let (mut year, mut month, mut day, mut hour, mut minute, mut second) = (
            zoned.year(),
            zoned.month(),
            zoned.day(),
            zoned.hour(),
            zoned.minute(),
            zoned.second(),
        );

        loop {
            let (y, mo, d, h, mi, s, complete) = self.refine_step(year, month, day, hour, minute, second);
            year = y;
            month = mo;
            day = d;
            hour = h;
            minute = mi;
            second = s;

            if complete {
                if let Some(instant) = self.resolve(year, month, day, hour, minute, second) {
                    return instant;
                }
                // DST gap: the resolved civil time doesn't exist. Nudge one
                // second forward and let the loop re-legalize around it.
                second += 1;
                continue;
            }

            if year - start_year > self.horizon_years {
                return NEVER;
            }
        }
    }

    fn last(&self) -> DateTime<Utc> {
        NEVER
    }
}

/// One-shot schedule: `next` always returns the same instant `T`.
#[derive(Debug, Clone, Copy)]
pub struct FixedSchedule {
    at: DateTime<Utc>,
}

impl FixedSchedule {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Schedule for FixedSchedule {
    fn next(&self, _after: DateTime<Utc>) -> DateTime<Utc> {
        self.at
    }

    fn last(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Parse a six-field crontab spec, evaluated in UTC.
///
/// # Errors
/// Returns [`CronError::InvalidParameter`] if `spec` isn't a valid
/// six-field expression.
pub fn parse(spec: &str) -> Result<TimeSchedule> {
    TimeSchedule::parse(spec, Tz::UTC)
}

/// Parse a six-field crontab spec, evaluated in the given IANA timezone.
///
/// # Errors
/// Returns [`CronError::InvalidParameter`] if `spec` isn't a valid
/// six-field expression.
pub fn parse_in_timezone(spec: &str, timezone: Tz) -> Result<TimeSchedule> {
    TimeSchedule::parse(spec, timezone)
}

impl std::str::FromStr for TimeSchedule {
    type Err = CronError;

    fn from_str(spec: &str) -> Result<Self> {
        parse(spec)
    }
}
