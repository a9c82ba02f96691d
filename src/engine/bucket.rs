//! Time bucket policy
//!
//! Maps a wall-clock instant onto the start of the bucket it falls in. Streams
//! roll over to a new file whenever the bucket of the current write differs
//! from the bucket of the file they have open.

use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::error::{LogError, LogResult};

/// Length of the `YYYY-MM-DD-HH-MM` suffix embedded in file names
pub const FILE_SUFFIX_LEN: usize = 16;

/// Bucket width in minutes, always a divisor of 60
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucketPolicy {
    bucket_minutes: u32,
}

impl TimeBucketPolicy {
    /// Build a policy, rejecting widths that do not divide the hour evenly
    pub fn new(bucket_minutes: u32) -> LogResult<Self> {
        if bucket_minutes == 0 {
            return Err(LogError::invalid_config("bucket_minutes cannot be zero"));
        }
        if bucket_minutes > 60 {
            return Err(LogError::invalid_config(format!(
                "bucket_minutes cannot be greater than 60: {}",
                bucket_minutes
            )));
        }
        if 60 % bucket_minutes != 0 {
            return Err(LogError::invalid_config(format!(
                "bucket_minutes must be a divisor of 60: {}",
                bucket_minutes
            )));
        }
        Ok(Self { bucket_minutes })
    }

    /// Configured bucket width
    pub fn bucket_minutes(&self) -> u32 {
        self.bucket_minutes
    }

    /// First minute of the bucket containing `minute`
    pub fn origin_minute(&self, minute: u32) -> u32 {
        (minute / self.bucket_minutes) * self.bucket_minutes
    }

    /// Bucket tag for an instant
    pub fn bucket_of(&self, now: &NaiveDateTime) -> BucketTag {
        BucketTag {
            year: now.year(),
            month: now.month(),
            day: now.day(),
            hour: now.hour(),
            minute: self.origin_minute(now.minute()),
        }
    }
}

/// Identity of one bucket window
///
/// Field order matches chronological order, so the derived `Ord` sorts tags
/// by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketTag {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
}

impl BucketTag {
    /// Suffix used in file names: `YYYY-MM-DD-HH-MM`
    pub fn file_suffix(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}-{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }

    /// Start minute of the bucket
    pub fn minute(&self) -> u32 {
        self.minute
    }
}

impl fmt::Display for BucketTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, 42)
            .unwrap()
    }

    #[test]
    fn test_divisors_of_sixty_accepted() {
        let valid = [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60];
        for minutes in 0..=100 {
            let result = TimeBucketPolicy::new(minutes);
            if valid.contains(&minutes) {
                assert!(result.is_ok(), "{} should be accepted", minutes);
            } else {
                assert!(
                    matches!(result, Err(LogError::InvalidConfig(_))),
                    "{} should be rejected",
                    minutes
                );
            }
        }
    }

    #[test]
    fn test_origin_is_monotonic_within_hour() {
        for width in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
            let policy = TimeBucketPolicy::new(width).unwrap();
            let mut last = 0;
            for minute in 0..60 {
                let origin = policy.origin_minute(minute);
                assert!(origin >= last);
                assert!(origin <= minute);
                assert_eq!(policy.origin_minute(origin), origin);
                last = origin;
            }
        }
    }

    #[test]
    fn test_bucket_tag_format() {
        let policy = TimeBucketPolicy::new(15).unwrap();
        let tag = policy.bucket_of(&at(10, 7));
        assert_eq!(tag.to_string(), "202403091000");
        assert_eq!(tag.file_suffix(), "2024-03-09-10-00");
        assert_eq!(tag.file_suffix().len(), FILE_SUFFIX_LEN);
    }

    #[test]
    fn test_same_window_same_tag() {
        let policy = TimeBucketPolicy::new(15).unwrap();
        assert_eq!(policy.bucket_of(&at(10, 7)), policy.bucket_of(&at(10, 12)));
        assert_ne!(policy.bucket_of(&at(10, 12)), policy.bucket_of(&at(10, 16)));
        assert_eq!(policy.bucket_of(&at(10, 16)).minute(), 15);
    }

    #[test]
    fn test_tags_order_chronologically() {
        let policy = TimeBucketPolicy::new(20).unwrap();
        let early = policy.bucket_of(&at(9, 59));
        let late = policy.bucket_of(&at(10, 0));
        assert!(early < late);
        assert!(early.to_string() < late.to_string());
    }
}
