pub mod time {

    // 0001-01-01 to 1970-01-01 in 100-ns intervals
    pub const EPOCH_TICKS: i64 = 621_355_968_000_000_000;

    const TICKS_PER_SECOND: i64 = 10_000_000;
    const TICKS_PER_MICROSECOND: i64 = 10;
    const NANOS_PER_TICK: i64 = 100;

    // Number of 100-nanosecond intervals since midnight UTC on
    // January 1st, year 1 of the proleptic Gregorian calendar.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Ticks(i64);

    impl From<i64> for Ticks {
        fn from(raw: i64) -> Self {
            Self(raw)
        }
    }

    impl From<Ticks> for i64 {
        fn from(ticks: Ticks) -> Self {
            ticks.0
        }
    }

    impl From<Ticks> for chrono::NaiveDateTime {
        fn from(ticks: Ticks) -> Self {
            let delta = ticks.0.saturating_sub(EPOCH_TICKS);
            let seconds = delta.div_euclid(TICKS_PER_SECOND);
            let nanos = (delta.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;

            // Every i64 tick count lands within the representable calendar
            // range; the clamp arms keep the conversion total anyway.
            match chrono::DateTime::from_timestamp(seconds, nanos) {
                Some(instant) => instant.naive_utc(),
                None if delta < 0 => chrono::NaiveDateTime::MIN,
                None => chrono::NaiveDateTime::MAX,
            }
        }
    }

    impl From<chrono::NaiveDateTime> for Ticks {
        fn from(stamp: chrono::NaiveDateTime) -> Self {
            let instant = stamp.and_utc();
            // Whole seconds floor toward the past; the microsecond remainder
            // is non-negative. Anything finer than a microsecond is dropped.
            let seconds = instant.timestamp();
            let micros = i64::from(instant.timestamp_subsec_micros());

            Self(
                seconds
                    .saturating_mul(TICKS_PER_SECOND)
                    .saturating_add(micros * TICKS_PER_MICROSECOND)
                    .saturating_add(EPOCH_TICKS),
            )
        }
    }

    impl From<chrono::DateTime<chrono::FixedOffset>> for Ticks {
        fn from(stamp: chrono::DateTime<chrono::FixedOffset>) -> Self {
            Self::from(stamp.naive_utc())
        }
    }

    impl std::fmt::Display for Ticks {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::str::FromStr for Ticks {
        type Err = std::num::ParseIntError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            s.parse::<i64>().map(Self)
        }
    }

}
