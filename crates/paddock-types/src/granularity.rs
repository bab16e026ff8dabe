//! Rollup granularities and their canonical UTC buckets.
//!
//! Every bucket is a half-open interval `[start, end)`. Buckets of one
//! granularity never overlap and leave no gaps: the end of a bucket is
//! always the start of the next one.
//!
//! | Granularity | Bucket start |
//! |-------------|--------------|
//! | `HOURLY` | top of the hour |
//! | `DAILY` | UTC midnight |
//! | `WEEKLY` | UTC midnight of the Monday opening the week |
//! | `MONTHLY` | UTC midnight of the first day of the month |
//! | `YEARLY` | UTC midnight of 1 January |

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{ParseError, ParseResult};

/// Rollup period size.
///
/// Variants are declared in order of increasing duration, so the derived
/// `Ord` sorts `Hourly < Daily < Weekly < Monthly < Yearly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    /// Every granularity, finest first.
    pub const ALL: [Granularity; 5] = [
        Granularity::Hourly,
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
        Granularity::Yearly,
    ];

    /// The upper-case name used in storage and configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "HOURLY",
            Granularity::Daily => "DAILY",
            Granularity::Weekly => "WEEKLY",
            Granularity::Monthly => "MONTHLY",
            Granularity::Yearly => "YEARLY",
        }
    }

    /// Truncate `ts` to the start of the bucket that contains it.
    ///
    /// # Examples
    ///
    /// ```
    /// use paddock_types::Granularity;
    /// use time::macros::datetime;
    ///
    /// let ts = datetime!(2024-03-07 14:25:00 UTC); // a Thursday
    /// assert_eq!(Granularity::Daily.bucket_start(ts).unwrap(), datetime!(2024-03-07 00:00 UTC));
    /// assert_eq!(Granularity::Weekly.bucket_start(ts).unwrap(), datetime!(2024-03-04 00:00 UTC));
    /// assert_eq!(Granularity::Monthly.bucket_start(ts).unwrap(), datetime!(2024-03-01 00:00 UTC));
    /// ```
    pub fn bucket_start(&self, ts: OffsetDateTime) -> ParseResult<OffsetDateTime> {
        let ts = ts.to_offset(UtcOffset::UTC);
        let date = ts.date();

        let start: PrimitiveDateTime = match self {
            Granularity::Hourly => date.with_hms(ts.hour(), 0, 0).map_err(out_of_range)?,
            Granularity::Daily => date.midnight(),
            Granularity::Weekly => {
                let back = i64::from(date.weekday().number_days_from_monday());
                date.checked_sub(Duration::days(back))
                    .ok_or_else(|| ParseError::OutOfRange(ts.to_string()))?
                    .midnight()
            }
            Granularity::Monthly => date.replace_day(1).map_err(out_of_range)?.midnight(),
            Granularity::Yearly => Date::from_calendar_date(date.year(), Month::January, 1)
                .map_err(out_of_range)?
                .midnight(),
        };

        Ok(start.assume_utc())
    }

    /// The exclusive end of the bucket starting at `start`.
    ///
    /// `start` is expected to be canonical; see [`Bucket::new`] for the
    /// validating constructor.
    pub fn bucket_end(&self, start: OffsetDateTime) -> ParseResult<OffsetDateTime> {
        let overflow = || ParseError::OutOfRange(start.to_string());

        match self {
            Granularity::Hourly => start.checked_add(Duration::HOUR).ok_or_else(overflow),
            Granularity::Daily => start.checked_add(Duration::DAY).ok_or_else(overflow),
            Granularity::Weekly => start.checked_add(Duration::WEEK).ok_or_else(overflow),
            Granularity::Monthly => {
                let date = start.date();
                let (year, month) = match date.month() {
                    Month::December => (date.year() + 1, Month::January),
                    m => (date.year(), m.next()),
                };
                Ok(Date::from_calendar_date(year, month, 1)
                    .map_err(out_of_range)?
                    .midnight()
                    .assume_utc())
            }
            Granularity::Yearly => Ok(Date::from_calendar_date(start.year() + 1, Month::January, 1)
                .map_err(out_of_range)?
                .midnight()
                .assume_utc()),
        }
    }

    /// Whether `start` is a canonical bucket start for this granularity.
    #[must_use]
    pub fn is_aligned(&self, start: OffsetDateTime) -> bool {
        self.bucket_start(start).is_ok_and(|s| s == start)
    }
}

fn out_of_range(e: time::error::ComponentRange) -> ParseError {
    ParseError::OutOfRange(e.to_string())
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOURLY" => Ok(Granularity::Hourly),
            "DAILY" => Ok(Granularity::Daily),
            "WEEKLY" => Ok(Granularity::Weekly),
            "MONTHLY" => Ok(Granularity::Monthly),
            "YEARLY" => Ok(Granularity::Yearly),
            _ => Err(ParseError::UnknownGranularity(s.to_string())),
        }
    }
}

/// A concrete half-open interval `[start, end)` of one granularity.
///
/// A `Bucket` can only be built from a canonical start, so holding one is
/// proof that its boundaries are aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket {
    granularity: Granularity,
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl Bucket {
    /// The bucket of `granularity` that contains `ts`.
    pub fn containing(granularity: Granularity, ts: OffsetDateTime) -> ParseResult<Self> {
        let start = granularity.bucket_start(ts)?;
        let end = granularity.bucket_end(start)?;
        Ok(Self {
            granularity,
            start,
            end,
        })
    }

    /// Build a bucket from its start.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidBucket`] when `start` is not aligned to
    /// `granularity` (for example a `DAILY` bucket starting at 05:00).
    pub fn new(granularity: Granularity, start: OffsetDateTime) -> ParseResult<Self> {
        if !granularity.is_aligned(start) {
            return Err(ParseError::InvalidBucket { granularity, start });
        }
        let start = start.to_offset(UtcOffset::UTC);
        let end = granularity.bucket_end(start)?;
        Ok(Self {
            granularity,
            start,
            end,
        })
    }

    /// All buckets intersecting `[from, to)`, in ascending order.
    ///
    /// Returns an empty list when `to <= from`.
    pub fn covering(
        granularity: Granularity,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> ParseResult<Vec<Self>> {
        let mut buckets = Vec::new();
        if to <= from {
            return Ok(buckets);
        }

        let mut bucket = Self::containing(granularity, from)?;
        loop {
            buckets.push(bucket);
            if bucket.end >= to {
                break;
            }
            bucket = bucket.next()?;
        }
        Ok(buckets)
    }

    /// The bucket immediately after this one.
    pub fn next(&self) -> ParseResult<Self> {
        Self::new(self.granularity, self.end)
    }

    #[must_use]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Inclusive start.
    #[must_use]
    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    /// Whether `ts` falls in `[start, end)`.
    #[must_use]
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {})", self.granularity, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_granularity_ordering() {
        assert!(Granularity::Hourly < Granularity::Daily);
        assert!(Granularity::Daily < Granularity::Weekly);
        assert!(Granularity::Weekly < Granularity::Monthly);
        assert!(Granularity::Monthly < Granularity::Yearly);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("daily".parse::<Granularity>().unwrap(), Granularity::Daily);
        assert_eq!("YEARLY".parse::<Granularity>().unwrap(), Granularity::Yearly);
        assert!(matches!(
            "fortnightly".parse::<Granularity>(),
            Err(ParseError::UnknownGranularity(_))
        ));
    }

    #[test]
    fn test_hourly_bucket() {
        let bucket = Bucket::containing(Granularity::Hourly, datetime!(2024-03-01 14:59:59 UTC))
            .unwrap();
        assert_eq!(bucket.start(), datetime!(2024-03-01 14:00 UTC));
        assert_eq!(bucket.end(), datetime!(2024-03-01 15:00 UTC));
    }

    #[test]
    fn test_daily_bucket_uses_utc_day() {
        // 2024-03-02 01:00 at +08:00 is still 2024-03-01 in UTC
        let ts = datetime!(2024-03-02 01:00 +08:00);
        let bucket = Bucket::containing(Granularity::Daily, ts).unwrap();
        assert_eq!(bucket.start(), datetime!(2024-03-01 00:00 UTC));
        assert_eq!(bucket.end(), datetime!(2024-03-02 00:00 UTC));
    }

    #[test]
    fn test_weekly_bucket_starts_monday() {
        // Sunday belongs to the week that started the previous Monday
        let sunday = datetime!(2024-03-10 23:00 UTC);
        let bucket = Bucket::containing(Granularity::Weekly, sunday).unwrap();
        assert_eq!(bucket.start(), datetime!(2024-03-04 00:00 UTC));
        assert_eq!(bucket.end(), datetime!(2024-03-11 00:00 UTC));
        assert!(bucket.contains(sunday));
    }

    #[test]
    fn test_monthly_bucket_handles_leap_february() {
        let bucket = Bucket::containing(Granularity::Monthly, datetime!(2024-02-29 12:00 UTC))
            .unwrap();
        assert_eq!(bucket.start(), datetime!(2024-02-01 00:00 UTC));
        assert_eq!(bucket.end(), datetime!(2024-03-01 00:00 UTC));
    }

    #[test]
    fn test_monthly_bucket_rolls_over_year() {
        let bucket = Bucket::containing(Granularity::Monthly, datetime!(2023-12-31 23:59 UTC))
            .unwrap();
        assert_eq!(bucket.end(), datetime!(2024-01-01 00:00 UTC));
    }

    #[test]
    fn test_yearly_bucket() {
        let bucket = Bucket::containing(Granularity::Yearly, datetime!(2024-07-04 00:00 UTC))
            .unwrap();
        assert_eq!(bucket.start(), datetime!(2024-01-01 00:00 UTC));
        assert_eq!(bucket.end(), datetime!(2025-01-01 00:00 UTC));
    }

    #[test]
    fn test_new_rejects_unaligned_start() {
        let result = Bucket::new(Granularity::Daily, datetime!(2024-03-01 05:00 UTC));
        assert!(matches!(
            result,
            Err(ParseError::InvalidBucket {
                granularity: Granularity::Daily,
                ..
            })
        ));

        // A Wednesday is not a week start
        assert!(Bucket::new(Granularity::Weekly, datetime!(2024-03-06 00:00 UTC)).is_err());
        assert!(Bucket::new(Granularity::Weekly, datetime!(2024-03-04 00:00 UTC)).is_ok());
    }

    #[test]
    fn test_new_normalizes_offset() {
        // Same instant as 2024-03-01 00:00 UTC
        let bucket = Bucket::new(Granularity::Daily, datetime!(2024-03-01 08:00 +08:00)).unwrap();
        assert_eq!(bucket.start().offset(), UtcOffset::UTC);
        assert_eq!(bucket.start(), datetime!(2024-03-01 00:00 UTC));
    }

    #[test]
    fn test_covering_partitions_range() {
        let from = datetime!(2024-01-15 06:00 UTC);
        let to = datetime!(2024-04-02 00:00 UTC);
        let buckets = Bucket::covering(Granularity::Monthly, from, to).unwrap();

        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].start(), datetime!(2024-01-01 00:00 UTC));
        assert_eq!(buckets[3].start(), datetime!(2024-04-01 00:00 UTC));
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
    }

    #[test]
    fn test_covering_empty_range() {
        let t = datetime!(2024-01-15 06:00 UTC);
        assert!(Bucket::covering(Granularity::Daily, t, t).unwrap().is_empty());
    }
}

/// Property-based tests for bucket boundaries.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    // 1970-01-01 .. 2100-01-01
    const MAX_SECS: i64 = 4_102_444_800;

    fn granularity() -> impl Strategy<Value = Granularity> {
        prop::sample::select(Granularity::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn bucket_contains_its_timestamp(secs in 0i64..MAX_SECS, g in granularity()) {
            let ts = OffsetDateTime::from_unix_timestamp(secs).unwrap();
            let bucket = Bucket::containing(g, ts).unwrap();
            prop_assert!(bucket.contains(ts));
            prop_assert!(g.is_aligned(bucket.start()));
        }

        #[test]
        fn adjacent_buckets_share_boundaries(secs in 0i64..MAX_SECS, g in granularity()) {
            let ts = OffsetDateTime::from_unix_timestamp(secs).unwrap();
            let bucket = Bucket::containing(g, ts).unwrap();
            let next = bucket.next().unwrap();
            prop_assert_eq!(bucket.end(), next.start());
            prop_assert_eq!(Bucket::containing(g, bucket.end()).unwrap(), next);
            prop_assert!(!bucket.contains(bucket.end()));
        }

        #[test]
        fn covering_is_gapless(
            a in 0i64..MAX_SECS,
            span in 1i64..(400 * 86_400),
            g in granularity(),
        ) {
            let from = OffsetDateTime::from_unix_timestamp(a).unwrap();
            let to = from + Duration::seconds(span);
            let buckets = Bucket::covering(g, from, to).unwrap();

            prop_assert!(buckets[0].contains(from));
            prop_assert!(buckets[buckets.len() - 1].end() >= to);
            for pair in buckets.windows(2) {
                prop_assert_eq!(pair[0].end(), pair[1].start());
            }
        }
    }
}
