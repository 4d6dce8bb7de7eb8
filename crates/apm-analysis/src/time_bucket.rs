// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time bucket keys.
//!
//! A bucket is the calendar prefix of a UTC timestamp written as decimal digits,
//! so buckets of the same granularity sort and compare as plain integers:
//!
//! ```text
//! Minute  yyyyMMddHHmm   201803061542
//! Hour    yyyyMMddHH     2018030615
//! Day     yyyyMMdd       20180306
//! Month   yyyyMM         201803
//! ```

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
    ];

    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }

    /// Divisor that turns a minute bucket into a bucket of this granularity.
    fn minute_divisor(self) -> i64 {
        match self {
            Granularity::Minute => 1,
            Granularity::Hour => 100,
            Granularity::Day => 10_000,
            Granularity::Month => 1_000_000,
        }
    }
}

/// Maps a millisecond timestamp to its bucket at `granularity`.
///
/// Timestamps outside the range chrono can represent fall back to the epoch.
#[must_use]
pub fn bucket(timestamp_millis: i64, granularity: Granularity) -> i64 {
    let time = DateTime::<Utc>::from_timestamp_millis(timestamp_millis).unwrap_or_default();
    let month = i64::from(time.year()) * 100 + i64::from(time.month());
    let day = month * 100 + i64::from(time.day());
    let hour = day * 100 + i64::from(time.hour());
    match granularity {
        Granularity::Month => month,
        Granularity::Day => day,
        Granularity::Hour => hour,
        Granularity::Minute => hour * 100 + i64::from(time.minute()),
    }
}

#[must_use]
pub fn minute_bucket(timestamp_millis: i64) -> i64 {
    bucket(timestamp_millis, Granularity::Minute)
}

/// Granularity of `time_bucket`, told apart by its number of digits.
#[must_use]
pub fn granularity_of(time_bucket: i64) -> Granularity {
    match time_bucket {
        b if b >= 100_000_000_000 => Granularity::Minute,
        b if b >= 1_000_000_000 => Granularity::Hour,
        b if b >= 10_000_000 => Granularity::Day,
        _ => Granularity::Month,
    }
}

/// Converts a bucket to the enclosing bucket at `granularity`.
///
/// A bucket already at `granularity` or coarser is returned unchanged.
#[must_use]
pub fn rebucket(time_bucket: i64, granularity: Granularity) -> i64 {
    let source = granularity_of(time_bucket);
    if source >= granularity {
        return time_bucket;
    }
    time_bucket / (granularity.minute_divisor() / source.minute_divisor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // 2018-03-06T15:42:17.123Z
    const TS: i64 = 1_520_350_937_123;

    #[test]
    fn test_bucket_granularities() {
        assert_eq!(bucket(TS, Granularity::Minute), 201_803_061_542);
        assert_eq!(bucket(TS, Granularity::Hour), 2_018_030_615);
        assert_eq!(bucket(TS, Granularity::Day), 20_180_306);
        assert_eq!(bucket(TS, Granularity::Month), 201_803);
    }

    #[test]
    fn test_rebucket_matches_direct_bucket() {
        let minute = minute_bucket(TS);
        for granularity in Granularity::ALL {
            assert_eq!(rebucket(minute, granularity), bucket(TS, granularity));
        }
    }

    #[test]
    fn test_rebucket_from_coarser_buckets() {
        assert_eq!(rebucket(2_018_030_615, Granularity::Day), 20_180_306);
        assert_eq!(rebucket(2_018_030_615, Granularity::Month), 201_803);
        assert_eq!(rebucket(20_180_306, Granularity::Month), 201_803);
        assert_eq!(rebucket(201_803, Granularity::Month), 201_803);
        // never refines
        assert_eq!(rebucket(20_180_306, Granularity::Hour), 20_180_306);
    }

    #[test]
    fn test_granularity_of_bucket() {
        for granularity in Granularity::ALL {
            assert_eq!(granularity_of(bucket(TS, granularity)), granularity);
        }
        assert_eq!(granularity_of(bucket(0, Granularity::Minute)), Granularity::Minute);
    }

    #[test]
    fn test_same_minute_same_bucket() {
        let start_of_minute = TS - 17_123;
        assert_eq!(minute_bucket(start_of_minute), minute_bucket(start_of_minute + 59_999));
        assert!(minute_bucket(start_of_minute + 60_000) > minute_bucket(start_of_minute));
    }

    #[test]
    fn test_month_boundary() {
        // 2018-03-31T23:59:59.999Z and one millisecond later
        let end_of_march = 1_522_540_799_999;
        assert_eq!(bucket(end_of_march, Granularity::Month), 201_803);
        assert_eq!(bucket(end_of_march + 1, Granularity::Month), 201_804);
        assert_eq!(minute_bucket(end_of_march + 1), 201_804_010_000);
    }

    #[test]
    fn test_out_of_range_falls_back_to_epoch() {
        assert_eq!(bucket(i64::MAX, Granularity::Day), 19_700_101);
    }

    proptest! {
        #[test]
        fn bucket_is_monotonic(t1 in 0i64..4_102_444_800_000, delta in 0i64..10_000_000_000) {
            let t2 = t1 + delta;
            for granularity in Granularity::ALL {
                prop_assert!(bucket(t1, granularity) <= bucket(t2, granularity));
            }
        }
    }
}
