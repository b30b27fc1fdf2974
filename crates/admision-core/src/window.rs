//! Exam-day time window in the operator's local time zone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::error::ParseError;
use crate::model::Attempt;

/// Default local offset of the admission office.
pub const DEFAULT_TZ_OFFSET: &str = "-05:00";

/// Parse an offset of the form `+HH:MM` / `-HH:MM`.
pub fn parse_tz_offset(s: &str) -> Result<FixedOffset, ParseError> {
    let err = || ParseError::InvalidTzOffset(s.to_string());
    let s = s.trim();
    let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(err());
    };
    let (hh, mm) = rest.split_once(':').ok_or_else(err)?;
    let hh: i32 = hh.parse().map_err(|_| err())?;
    let mm: i32 = mm.parse().map_err(|_| err())?;
    if !(0..=23).contains(&hh) || !(0..=59).contains(&mm) {
        return Err(err());
    }
    FixedOffset::east_opt(sign * (hh * 3600 + mm * 60)).ok_or_else(err)
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ParseError::InvalidDate(s.to_string()))
}

/// Inclusive epoch window covering 00:00:00..=23:59:59 of one local day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExamWindow {
    pub date: NaiveDate,
    pub offset: FixedOffset,
    pub from: i64,
    pub to: i64,
}

impl ExamWindow {
    pub fn for_day(date: NaiveDate, offset: FixedOffset) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        let end = start + chrono::Duration::seconds(86_399);
        let from = offset
            .from_local_datetime(&start)
            .single()
            .map(|d| d.timestamp())
            .unwrap_or_default();
        let to = offset
            .from_local_datetime(&end)
            .single()
            .map(|d| d.timestamp())
            .unwrap_or_default();
        Self {
            date,
            offset,
            from,
            to,
        }
    }

    /// Build from the operator's `--date` and `--tz-offset` strings.
    pub fn parse(date: &str, tz_offset: &str) -> Result<Self, ParseError> {
        Ok(Self::for_day(parse_date(date)?, parse_tz_offset(tz_offset)?))
    }

    pub fn contains(&self, ts: i64) -> bool {
        (self.from..=self.to).contains(&ts)
    }

    /// Finished attempts that started or finished inside the window.
    pub fn contains_attempt(&self, attempt: &Attempt) -> bool {
        if attempt.time_finish == 0 {
            return false;
        }
        self.contains(attempt.time_finish) || self.contains(attempt.time_start)
    }

    /// Local wall-clock time for an epoch timestamp.
    pub fn local(&self, ts: i64) -> DateTime<FixedOffset> {
        DateTime::from_timestamp(ts, 0)
            .unwrap_or_default()
            .with_timezone(&self.offset)
    }

    /// `%Y-%m-%d %H:%M:%S` in the window's offset.
    pub fn format_local(&self, ts: i64) -> String {
        self.local(ts).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
