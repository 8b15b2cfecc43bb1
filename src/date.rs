use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

/// Directory name used when no release year is known.
pub const UNKNOWN_YEAR: &str = "Unknown Year";

/// Directory name used when no release quarter is known.
pub const UNKNOWN_QUARTER: &str = "Unknown Quarter";

// Matches `yyyy-mm-dd`, `yyyy/mm/dd`, `yyyy.mm.dd`, `yyyy-mm` and the date prefix of an ISO timestamp.
static RE_RELEASE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<year>\d{4})[-/.](?P<month>\d{1,2})(?:[-/.](?P<day>\d{1,2}))?(?:$|[T\s])")
        .expect("Failed to create regex pattern for release date")
});

/// Calendar quarter of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quarter {
    First,
    Second,
    Third,
    Fourth,
}

/// Year and month parsed from a provider release date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseDate {
    pub year: i32,
    pub month: u32,
}

impl Quarter {
    /// Quarter for a month number in 1..=12: `ceil(month / 3)`.
    #[must_use]
    pub const fn from_month(month: u32) -> Option<Self> {
        match month {
            1..=3 => Some(Self::First),
            4..=6 => Some(Self::Second),
            7..=9 => Some(Self::Third),
            10..=12 => Some(Self::Fourth),
            _ => None,
        }
    }

    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
            Self::Fourth => 4,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_quarter", self.number())
    }
}

impl ReleaseDate {
    /// Parse a release date string.
    ///
    /// Returns `None` for blank or malformed values and for impossible calendar dates.
    ///
    /// ```rust
    /// use media_sort::date::ReleaseDate;
    ///
    /// let date = ReleaseDate::parse("2021-04-10").unwrap();
    /// assert_eq!(date.year, 2021);
    /// assert_eq!(date.quarter().to_string(), "2_quarter");
    /// assert!(ReleaseDate::parse("").is_none());
    /// ```
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let captures = RE_RELEASE_DATE.captures(value)?;
        let year = captures.name("year")?.as_str().parse::<i32>().ok()?;
        let month = captures.name("month")?.as_str().parse::<u32>().ok()?;
        let day = match captures.name("day") {
            Some(day) => day.as_str().parse::<u32>().ok()?,
            None => 1,
        };
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self {
            year: date.year(),
            month: date.month(),
        })
    }

    #[must_use]
    pub const fn quarter(&self) -> Quarter {
        match Quarter::from_month(self.month) {
            Some(quarter) => quarter,
            // Month always comes from a validated chrono date.
            None => Quarter::Fourth,
        }
    }
}
