use crate::error::{Result, StatementError};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Monthly,
    Quarterly,
    Annual,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Self::Monthly, Self::Quarterly, Self::Annual];

    pub fn bucket(&self, date: NaiveDate) -> PeriodBucket {
        match self {
            Self::Monthly => PeriodBucket::Month {
                year: date.year(),
                month: date.month(),
            },
            Self::Quarterly => PeriodBucket::Quarter {
                year: date.year(),
                quarter: quarter_of(date.month()),
            },
            Self::Annual => PeriodBucket::Year { year: date.year() },
        }
    }
}

/// A monthly (`YYYY-MM`), quarterly (`YYYY-Qn`) or annual (`YYYY`) key.
///
/// Ordering is chronological within a granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodBucket {
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    Year { year: i32 },
}

impl PeriodBucket {
    pub fn next(&self) -> Self {
        match *self {
            Self::Month { year, month: 12 } => Self::Month {
                year: year + 1,
                month: 1,
            },
            Self::Month { year, month } => Self::Month {
                year,
                month: month + 1,
            },
            Self::Quarter { year, quarter: 4 } => Self::Quarter {
                year: year + 1,
                quarter: 1,
            },
            Self::Quarter { year, quarter } => Self::Quarter {
                year,
                quarter: quarter + 1,
            },
            Self::Year { year } => Self::Year { year: year + 1 },
        }
    }
}

impl fmt::Display for PeriodBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Self::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
            Self::Year { year } => write!(f, "{:04}", year),
        }
    }
}

impl Serialize for PeriodBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The three bucket keys a single transaction date falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodKeys {
    pub month: PeriodBucket,
    pub quarter: PeriodBucket,
    pub year: PeriodBucket,
}

impl PeriodKeys {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: Granularity::Monthly.bucket(date),
            quarter: Granularity::Quarterly.bucket(date),
            year: Granularity::Annual.bucket(date),
        }
    }

    pub fn get(&self, granularity: Granularity) -> PeriodBucket {
        match granularity {
            Granularity::Monthly => self.month,
            Granularity::Quarterly => self.quarter,
            Granularity::Annual => self.year,
        }
    }
}

/// The ordered, gap-free bucket keys every row of a report is aligned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodAxis {
    #[serde(rename = "meses")]
    pub months: Vec<PeriodBucket>,
    #[serde(rename = "trimestres")]
    pub quarters: Vec<PeriodBucket>,
    #[serde(rename = "anos")]
    pub years: Vec<PeriodBucket>,
}

impl PeriodAxis {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every bucket between `start` and `end`, both inclusive.
    pub fn spanning(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            return Self::empty();
        }
        Self {
            months: buckets_between(Granularity::Monthly, start, end),
            quarters: buckets_between(Granularity::Quarterly, start, end),
            years: buckets_between(Granularity::Annual, start, end),
        }
    }

    pub fn buckets(&self, granularity: Granularity) -> &[PeriodBucket] {
        match granularity {
            Granularity::Monthly => &self.months,
            Granularity::Quarterly => &self.quarters,
            Granularity::Annual => &self.years,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }
}

fn buckets_between(granularity: Granularity, start: NaiveDate, end: NaiveDate) -> Vec<PeriodBucket> {
    let last = granularity.bucket(end);
    let mut current = granularity.bucket(start);
    let mut buckets = Vec::new();
    while current <= last {
        buckets.push(current);
        current = current.next();
    }
    buckets
}

pub fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

/// Parses the period-relevant date of a ledger row.
///
/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY`, `YYYY/MM/DD` and ISO-like datetimes.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StatementError::InvalidDate("empty date".to_string()));
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime.date());
        }
    }

    Err(StatementError::InvalidDate(format!(
        "'{}'. Expected YYYY-MM-DD or DD/MM/YYYY",
        trimmed
    )))
}
