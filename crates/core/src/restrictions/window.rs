//! Calendar-aligned recurring windows.
//!
//! A period strategy such as `"1d"`, `"2w"`, `"1M"` or `"1y"` splits local
//! time, starting from an anchor instant, into consecutive windows. The
//! resolver finds the window that contains `now` and returns its bounds in
//! UTC. All arithmetic happens on the restriction's local calendar so that
//! a daily window stays aligned to local midnight across DST changes.
//!
//! Shifting a date by whole months or years clamps the day to the last
//! valid day of the target month (Feb 29 + 1y is Feb 28). Window bounds are
//! always computed from the anchor itself so clamping never drifts, which
//! means callers must keep passing the original anchor and not a clamped
//! window start.

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;
use quotagate_common::AppError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Malformed period configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("invalid period strategy: {0:?}")]
    InvalidStrategy(String),

    #[error("unknown period unit: {0:?}")]
    UnknownUnit(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("date out of range")]
    OutOfRange,
}

impl From<WindowError> for AppError {
    fn from(err: WindowError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Calendar unit of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeriodUnit {
    Year,
    Month,
    Week,
    Day,
}

impl PeriodUnit {
    const fn symbol(self) -> char {
        match self {
            Self::Year => 'y',
            Self::Month => 'M',
            Self::Week => 'w',
            Self::Day => 'd',
        }
    }
}

/// A parsed `<count><unit>` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodStrategy {
    pub count: u32,
    pub unit: PeriodUnit,
}

impl FromStr for PeriodStrategy {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WindowError::InvalidStrategy(s.to_string());

        let mut chars = s.chars();
        let symbol = chars.next_back().ok_or_else(invalid)?;
        let count: u32 = chars.as_str().parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        let unit = match symbol {
            'y' => PeriodUnit::Year,
            'M' => PeriodUnit::Month,
            'w' => PeriodUnit::Week,
            'd' => PeriodUnit::Day,
            other => return Err(WindowError::UnknownUnit(other.to_string())),
        };

        Ok(Self { count, unit })
    }
}

impl fmt::Display for PeriodStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.symbol())
    }
}

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl PeriodStrategy {
    /// Resolve the current window for every anchor.
    ///
    /// The number of elapsed periods is derived from the first anchor only
    /// and applied to all of them, so a start/end pair moves together.
    pub fn resolve(
        &self,
        anchors: &[NaiveDateTime],
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Vec<Window>, WindowError> {
        self.resolve_local(anchors, tz, now)?
            .into_iter()
            .map(|(start, end)| to_window(tz, start, end))
            .collect()
    }

    /// Same as [`resolve`](Self::resolve) but returns wall-clock bounds in `tz`.
    pub fn resolve_local(
        &self,
        anchors: &[NaiveDateTime],
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, WindowError> {
        let Some(first) = anchors.first().copied() else {
            return Ok(Vec::new());
        };
        let now_local = local_now(tz, now);
        let count = i64::from(self.count);

        match self.unit {
            PeriodUnit::Year | PeriodUnit::Month => {
                let (elapsed, months_per_unit) = if self.unit == PeriodUnit::Year {
                    (elapsed_years(first, now_local)?, 12)
                } else {
                    (elapsed_months(first, now_local)?, 1)
                };
                let step = count * months_per_unit;
                // Future anchors resolve to their own first period.
                let offset = (elapsed.max(0) / count) * step;

                anchors
                    .iter()
                    .map(|anchor| -> Result<_, WindowError> {
                        Ok((
                            shift_months(*anchor, offset)?,
                            shift_months(*anchor, offset + step)?,
                        ))
                    })
                    .collect()
            }
            PeriodUnit::Day | PeriodUnit::Week => {
                let period = if self.unit == PeriodUnit::Week {
                    count * 7
                } else {
                    count
                };
                let elapsed = (now_local - first).num_days();
                let offset = (elapsed.max(0) / period) * period;

                anchors
                    .iter()
                    .map(|anchor| -> Result<_, WindowError> {
                        Ok((
                            shift_days(*anchor, offset)?,
                            shift_days(*anchor, offset + period)?,
                        ))
                    })
                    .collect()
            }
        }
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, WindowError> {
    name.parse()
        .map_err(|_| WindowError::UnknownTimezone(name.to_string()))
}

/// Resolve windows from raw strategy and timezone strings.
pub fn resolve_windows(
    anchors: &[NaiveDateTime],
    timezone: &str,
    strategy: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Window>, WindowError> {
    let strategy: PeriodStrategy = strategy.parse()?;
    let tz = parse_timezone(timezone)?;
    strategy.resolve(anchors, tz, now)
}

/// Wall-clock reading of `now` in `tz`.
#[must_use]
pub fn local_now(tz: Tz, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&tz).naive_local()
}

/// Attach `tz` to a wall-clock time.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap use the offset in effect before the transition, so 02:30 in a
/// 02:00-03:00 gap becomes 03:30.
pub fn localize(tz: Tz, local: NaiveDateTime) -> Result<DateTime<Tz>, WindowError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => Ok(instant),
        LocalResult::None => {
            let before = shift_hours(local, -3)?;
            let offset = tz
                .offset_from_local_datetime(&before)
                .earliest()
                .ok_or(WindowError::OutOfRange)?
                .fix();
            let seconds =
                TimeDelta::try_seconds(i64::from(offset.local_minus_utc())).ok_or(WindowError::OutOfRange)?;
            let utc = local
                .checked_sub_signed(seconds)
                .ok_or(WindowError::OutOfRange)?;
            Ok(tz.from_utc_datetime(&utc))
        }
    }
}

fn to_window(tz: Tz, start: NaiveDateTime, end: NaiveDateTime) -> Result<Window, WindowError> {
    Ok(Window {
        start: localize(tz, start)?.with_timezone(&Utc),
        end: localize(tz, end)?.with_timezone(&Utc),
    })
}

/// Whole years from `anchor` to `now`, less one if this year's anniversary is still ahead.
fn elapsed_years(anchor: NaiveDateTime, now: NaiveDateTime) -> Result<i64, WindowError> {
    let mut years = i64::from(now.year()) - i64::from(anchor.year());
    if now < shift_months(anchor, years * 12)? {
        years -= 1;
    }
    Ok(years)
}

/// Whole months from `anchor` to `now`, less one if this month's anniversary is still ahead.
fn elapsed_months(anchor: NaiveDateTime, now: NaiveDateTime) -> Result<i64, WindowError> {
    let mut months = (i64::from(now.year()) - i64::from(anchor.year())) * 12
        + (i64::from(now.month()) - i64::from(anchor.month()));
    if now < shift_months(anchor, months)? {
        months -= 1;
    }
    Ok(months)
}

/// Move a wall-clock time by whole months, clamping the day of month.
fn shift_months(local: NaiveDateTime, months: i64) -> Result<NaiveDateTime, WindowError> {
    let total = i64::from(local.year()) * 12 + i64::from(local.month0()) + months;
    let year = i32::try_from(total.div_euclid(12)).map_err(|_| WindowError::OutOfRange)?;
    let month = u32::try_from(total.rem_euclid(12) + 1).map_err(|_| WindowError::OutOfRange)?;
    let day = local.day().min(days_in_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| date.and_time(local.time()))
        .ok_or(WindowError::OutOfRange)
}

fn shift_days(local: NaiveDateTime, days: i64) -> Result<NaiveDateTime, WindowError> {
    TimeDelta::try_days(days)
        .and_then(|delta| local.checked_add_signed(delta))
        .ok_or(WindowError::OutOfRange)
}

fn shift_hours(local: NaiveDateTime, hours: i64) -> Result<NaiveDateTime, WindowError> {
    TimeDelta::try_hours(hours)
        .and_then(|delta| local.checked_add_signed(delta))
        .ok_or(WindowError::OutOfRange)
}

/// Get the number of days in a month.
const fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}
