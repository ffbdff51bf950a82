//! Property-based tests for the minute window and period arithmetic

use chrono::{DateTime, Datelike, Utc};
use proptest::prelude::*;

use super::budget::{counter_expiry, month_start_after, period_id};
use super::window::SlidingWindowLimiter;

proptest! {
    #[test]
    fn prop_window_never_exceeds_max(
        max in 1u32..30,
        steps in prop::collection::vec(0u64..20, 1..200)
    ) {
        let limiter = SlidingWindowLimiter::new(max, 60);
        let mut now = 1_000u64;

        for step in steps {
            now += step;
            limiter.try_admit(now);
            prop_assert!(limiter.current_count(now) <= max);
        }
    }

    #[test]
    fn prop_next_slot_zero_when_room(
        max in 1u32..10,
        steps in prop::collection::vec(0u64..30, 1..100)
    ) {
        let limiter = SlidingWindowLimiter::new(max, 60);
        let mut now = 5_000u64;

        for step in steps {
            now += step;
            limiter.try_admit(now);
            let wait = limiter.seconds_until_next_slot(now);
            if limiter.current_count(now) < max {
                prop_assert_eq!(wait, 0);
            } else {
                prop_assert!(wait <= 60);
            }
        }
    }

    #[test]
    fn prop_window_empties_after_full_window(
        max in 1u32..30,
        admitted in 0usize..40
    ) {
        let limiter = SlidingWindowLimiter::new(max, 60);
        for _ in 0..admitted {
            limiter.try_admit(100);
        }
        prop_assert_eq!(limiter.current_count(161), 0);
    }

    #[test]
    fn prop_expiry_is_two_month_starts_ahead(secs in 0i64..4_102_444_800) {
        let now = DateTime::from_timestamp(secs, 0).unwrap();
        let next_period = month_start_after(now, 1);
        let expiry = counter_expiry(now);

        prop_assert!(next_period > now.timestamp());
        // At least one full month (28 days) beyond the next period boundary
        prop_assert!(expiry - next_period >= 28 * 24 * 60 * 60);

        let expiry_at = DateTime::<Utc>::from_timestamp(expiry, 0).unwrap();
        prop_assert_eq!(expiry_at.day(), 1);
        prop_assert_ne!(period_id(expiry_at), period_id(now));
    }
}
