//! Manipulate time periods (as used in the onion service system)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The default length of a time period, per rend-spec-v3 section 2.2.1: 1440
/// minutes (24 hours).
pub const DEFAULT_TIME_PERIOD_LENGTH: Duration = Duration::from_secs(1440 * 60);

/// The default rotation offset applied before dividing into time periods: 12
/// hours.
///
/// This offset exists so that a time period boundary does not fall at
/// midnight UTC, which would make the period a service is using change at the
/// same moment that the date (as usually displayed) changes.
pub const DEFAULT_ROTATION_OFFSET: Duration = Duration::from_secs(12 * 60 * 60);

/// A period of time as used in the onion service system.
///
/// These time periods are used to derive a different `BlindedOnionIdKey`
/// during each period from each `OnionIdKey`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimePeriod {
    /// Index of the time periods that have passed since the unix epoch.
    interval_num: u64,
    /// The length of a time period, in seconds.
    length_in_sec: u32,
}

/// Return the number of whole minutes between the unix epoch and `when`.
///
/// Returns `None` if `when` precedes the epoch or the minute count would not
/// fit in a `i64`.
fn minutes_since_epoch(when: SystemTime) -> Option<i64> {
    let secs = when.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs / 60).ok()
}

impl TimePeriod {
    /// Construct a time period of a given `length` that contains `when`,
    /// using the default rotation offset.
    ///
    /// # Panics
    ///
    /// Panics if `when` precedes the Unix epoch, or if `length` is zero or
    /// does not fit in a `u32` number of seconds.
    pub fn new(length: Duration, when: SystemTime) -> Self {
        Self::with_offset(length, when, DEFAULT_ROTATION_OFFSET)
            .expect("tried to construct a TimePeriod for an unrepresentable time")
    }

    /// As `new`, but with an explicit rotation offset.
    ///
    /// Returns `None` if `when` precedes the Unix epoch.
    pub fn with_offset(length: Duration, when: SystemTime, offset: Duration) -> Option<Self> {
        let length_in_sec = u32::try_from(length.as_secs()).ok()?;
        if length_in_sec == 0 {
            return None;
        }
        let length_in_min = i64::from(length_in_sec) / 60;
        let offset_in_min = i64::try_from(offset.as_secs() / 60).ok()?;
        let t_min = minutes_since_epoch(when)?;

        let interval_num = (t_min - offset_in_min).div_euclid(length_in_min);
        let interval_num = u64::try_from(interval_num).ok()?;

        Some(TimePeriod {
            interval_num,
            length_in_sec,
        })
    }

    /// Return the numeric index of this time period.
    pub fn interval_num(&self) -> u64 {
        self.interval_num
    }

    /// Return the length of this time period, in seconds.
    pub fn length_in_sec(&self) -> u32 {
        self.length_in_sec
    }

    /// Return the time period after this one.
    ///
    /// Return None if this is the last representable time period.
    pub fn next(&self) -> Option<Self> {
        Some(TimePeriod {
            interval_num: self.interval_num.checked_add(1)?,
            length_in_sec: self.length_in_sec,
        })
    }

    /// Return the time period after this one.
    ///
    /// Return None if this is the first representable time period.
    pub fn prev(&self) -> Option<Self> {
        Some(TimePeriod {
            interval_num: self.interval_num.checked_sub(1)?,
            length_in_sec: self.length_in_sec,
        })
    }

    /// Return true if this time period contains `when`, under the default
    /// rotation offset.
    pub fn contains(&self, when: SystemTime) -> bool {
        match Self::with_offset(
            Duration::from_secs(u64::from(self.length_in_sec)),
            when,
            DEFAULT_ROTATION_OFFSET,
        ) {
            Some(tp) => tp == *self,
            None => false,
        }
    }

    /// Return the time at which this time period begins.
    fn start_offset_seconds(&self) -> Option<u64> {
        let offset_in_min = DEFAULT_ROTATION_OFFSET.as_secs() / 60;
        let length_in_min = u64::from(self.length_in_sec) / 60;
        let start_min = self
            .interval_num
            .checked_mul(length_in_min)?
            .checked_add(offset_in_min)?;
        start_min.checked_mul(60)
    }

    /// Return a range representing the [`SystemTime`] values contained within
    /// this time period.
    ///
    /// Return None if this time period contains no times that can be
    /// represented as a `SystemTime`.
    pub fn range(&self) -> Option<std::ops::Range<SystemTime>> {
        let start = self.start_offset_seconds()?;
        let end = self.next()?.start_offset_seconds()?;
        Some(
            (UNIX_EPOCH + Duration::from_secs(start))..(UNIX_EPOCH + Duration::from_secs(end)),
        )
    }

    /// Return true if `when` falls within the overlap period: the window,
    /// once per time period, during which a service is expected to have
    /// published descriptors for both the outgoing and the incoming time
    /// period.
    ///
    /// The overlap window spans the first half of each (UTC-epoch-aligned)
    /// time period of length `length`; the rotation offset that shifts
    /// [`TimePeriod::new`]'s boundary away from midnight does not apply here,
    /// since the overlap window is anchored to the underlying calendar
    /// period, not to the blinded-key rotation boundary.
    pub fn is_overlap(length: Duration, when: SystemTime) -> bool {
        let length_in_min = length.as_secs() / 60;
        if length_in_min == 0 {
            return false;
        }
        let Some(t_min) = minutes_since_epoch(when) else {
            return false;
        };
        let length_in_min = length_in_min as i64;
        t_min.rem_euclid(length_in_min) < length_in_min / 2
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_duration_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;

    /// Build a SystemTime from a Unix timestamp.
    fn unix(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn time_period_scenario_s2() {
        // 2016-04-13 11:00:00 UTC
        let t1 = unix(1_460_545_200);
        let tp = TimePeriod::new(DEFAULT_TIME_PERIOD_LENGTH, t1);
        assert_eq!(tp.interval_num(), 16903);

        // 2016-04-13 11:59:59 UTC: still the same period.
        let t2 = unix(1_460_545_200 + 3599);
        let tp2 = TimePeriod::new(DEFAULT_TIME_PERIOD_LENGTH, t2);
        assert_eq!(tp2.interval_num(), 16903);
        assert!(tp.contains(t2));

        // 2016-04-13 12:00:00 UTC: the next period.
        let t3 = unix(1_460_545_200 + 3600);
        let tp3 = TimePeriod::new(DEFAULT_TIME_PERIOD_LENGTH, t3);
        assert_eq!(tp3.interval_num(), 16904);
        assert!(!tp.contains(t3));

        assert_eq!(tp.next(), Some(tp3));
        assert_eq!(tp3.next().unwrap().interval_num(), 16905);

        // Next period start time is 2016-04-14 12:00:00 UTC.
        let range = tp3.range().unwrap();
        assert_eq!(range.end, unix(1_460_635_200));
    }

    #[test]
    fn overlap_period_s3() {
        // Consensus valid_after = 2016-04-13 00:00:00 UTC.
        let start = 1_460_505_600_u64;
        let almost_noon = unix(start + 11 * 3600 + 3599); // 11:59:59
        let noon = unix(start + 12 * 3600); // 12:00:00
        let end_of_day = unix(start + 86399); // 23:59:59

        assert!(TimePeriod::is_overlap(DEFAULT_TIME_PERIOD_LENGTH, unix(start)));
        assert!(TimePeriod::is_overlap(DEFAULT_TIME_PERIOD_LENGTH, almost_noon));
        assert!(!TimePeriod::is_overlap(DEFAULT_TIME_PERIOD_LENGTH, noon));
        assert!(!TimePeriod::is_overlap(DEFAULT_TIME_PERIOD_LENGTH, end_of_day));
    }

    #[test]
    fn prev_next_roundtrip() {
        let tp = TimePeriod::new(DEFAULT_TIME_PERIOD_LENGTH, unix(1_460_545_200));
        let next = tp.next().unwrap();
        assert_eq!(next.prev().unwrap(), tp);
    }
}
