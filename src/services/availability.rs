//! Mentor availability
//!
//! A working day is cut into fixed slots of `slot_minutes` between
//! `slot_start_hour` and `slot_end_hour`, local time. A slot is available
//! unless a scheduled session overlaps it (half-open intervals).

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::config::MentorshipConfig;
use crate::models::{MentorshipSession, SessionStatus, TimeSlot};

/// UTC instant of local midnight on `date`
fn local_midnight(date: NaiveDate, config: &MentorshipConfig) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)) - Duration::minutes(config.utc_offset_minutes as i64)
}

/// `[start, end)` of the bookable window on `date`, in UTC
pub fn day_window(date: NaiveDate, config: &MentorshipConfig) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = local_midnight(date, config);
    (
        midnight + Duration::hours(config.slot_start_hour as i64),
        midnight + Duration::hours(config.slot_end_hour as i64),
    )
}

/// Every slot of the day, booked or not
pub fn day_slots(date: NaiveDate, config: &MentorshipConfig) -> Vec<TimeSlot> {
    if config.slot_minutes == 0 {
        return Vec::new();
    }
    let (window_start, window_end) = day_window(date, config);
    let step = Duration::minutes(config.slot_minutes as i64);

    let mut slots = Vec::new();
    let mut starts_at = window_start;
    while starts_at + step <= window_end {
        slots.push(TimeSlot {
            starts_at,
            ends_at: starts_at + step,
        });
        starts_at += step;
    }
    slots
}

/// Slots on `date` not overlapped by any scheduled session
pub fn generate_available_slots(
    date: NaiveDate,
    config: &MentorshipConfig,
    sessions: &[MentorshipSession],
) -> Vec<TimeSlot> {
    day_slots(date, config)
        .into_iter()
        .filter(|slot| {
            !sessions
                .iter()
                .filter(|s| s.status == SessionStatus::Scheduled)
                .any(|s| s.overlaps(slot.starts_at, slot.ends_at))
        })
        .collect()
}

/// Local calendar date of `instant`
pub fn local_date(instant: DateTime<Utc>, config: &MentorshipConfig) -> NaiveDate {
    (instant + Duration::minutes(config.utc_offset_minutes as i64)).date_naive()
}


#[cfg(test)]
mod property_tests {
    use super::tests::session;
    use super::*;
    use proptest::prelude::*;

    fn config_strategy() -> impl Strategy<Value = MentorshipConfig> {
        (0u32..12, 1u32..12, prop::sample::select(vec![15u32, 30, 45, 60, 90]), -720i32..=840).prop_map(
            |(start, len, slot_minutes, utc_offset_minutes)| MentorshipConfig {
                slot_start_hour: start,
                slot_end_hour: start + len,
                slot_minutes,
                utc_offset_minutes,
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn no_sessions_yields_every_slot(config in config_strategy()) {
            let date = NaiveDate::from_ymd_opt(2030, 6, 15).unwrap();
            let slots = generate_available_slots(date, &config, &[]);
            let window = (config.slot_end_hour - config.slot_start_hour) * 60;
            prop_assert_eq!(slots.len() as u32, window / config.slot_minutes);
        }

        #[test]
        fn session_on_slot_removes_exactly_that_slot(config in config_strategy(), pick in any::<prop::sample::Index>()) {
            let date = NaiveDate::from_ymd_opt(2030, 6, 15).unwrap();
            let all = day_slots(date, &config);
            prop_assume!(!all.is_empty());

            let booked = all[pick.index(all.len())];
            let sessions = [session(booked.starts_at, config.slot_minutes as i32, SessionStatus::Scheduled)];
            let available = generate_available_slots(date, &config, &sessions);

            prop_assert_eq!(available.len(), all.len() - 1);
            prop_assert!(!available.contains(&booked));
            prop_assert!(all.iter().filter(|s| **s != booked).all(|s| available.contains(s)));
        }
    }
}
