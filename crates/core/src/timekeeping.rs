use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The single source of "what day is it" for the whole pipeline (§4.7).
///
/// A naked `Utc::now()` is forbidden outside this module: every business-date
/// resolution goes through `Clock::business_date`, so a misconfigured
/// timezone is a one-line fix instead of a grep across every component.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
    fn zone(&self) -> Tz;

    /// The business date for `now_utc()`, resolved in the configured zone.
    fn business_date(&self) -> NaiveDate {
        self.now_utc().with_timezone(&self.zone()).date_naive()
    }

    /// Next business-day 08:00 in the configured zone, as a UTC instant —
    /// used for raw-series cache expiry (Repository §4.1 `store_raw`).
    fn next_business_day_0800(&self) -> DateTime<Utc> {
        let local_now = self.now_utc().with_timezone(&self.zone());
        let next_day = local_now.date_naive() + chrono::Duration::days(1);
        let local_expiry = self
            .zone()
            .from_local_datetime(&next_day.and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap()))
            .single()
            .unwrap_or_else(|| {
                // DST fold/gap on the exact boundary: fall back to the
                // earliest valid interpretation rather than panicking.
                self.zone()
                    .from_local_datetime(&next_day.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap()))
                    .earliest()
                    .expect("09:00 local is unambiguous on any DST transition day")
            });
        local_expiry.with_timezone(&Utc)
    }
}

/// Production clock: wall-clock `Utc::now()` projected through a fixed,
/// deployment-configured IANA zone.
pub struct FixedZoneClock {
    zone: Tz,
}

impl FixedZoneClock {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }
}

impl Clock for FixedZoneClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone(&self) -> Tz {
        self.zone
    }
}

/// Deterministic clock for tests — notably the midnight-boundary scenarios
/// in the testable-properties section.
pub struct FixedInstantClock {
    pub instant: DateTime<Utc>,
    pub zone: Tz,
}

impl Clock for FixedInstantClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.instant
    }

    fn zone(&self) -> Tz {
        self.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn business_date_crosses_midnight_in_local_zone_not_utc() {
        // 23:58 New York on 2024-03-14 is 03:58 UTC on 2024-03-15.
        let instant = Utc.with_ymd_and_hms(2024, 3, 15, 3, 58, 0).unwrap();
        let clock = FixedInstantClock {
            instant,
            zone: chrono_tz::America::New_York,
        };
        assert_eq!(clock.business_date(), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }

    #[test]
    fn business_date_just_after_local_midnight_rolls_over() {
        // 00:03 New York on 2024-03-15 is 04:03 UTC on 2024-03-15.
        let instant = Utc.with_ymd_and_hms(2024, 3, 15, 4, 3, 0).unwrap();
        let clock = FixedInstantClock {
            instant,
            zone: chrono_tz::America::New_York,
        };
        assert_eq!(clock.business_date(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn next_business_day_0800_is_one_day_ahead() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let clock = FixedInstantClock {
            instant,
            zone: chrono_tz::America::New_York,
        };
        let expiry = clock.next_business_day_0800();
        let local_expiry = expiry.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(local_expiry.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(local_expiry.time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }
}
