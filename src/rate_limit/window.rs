//! Sliding Window Limiter
//!
//! Admits at most `max_per_window` calls inside any trailing window of
//! `window_secs` seconds. Timestamps are whole seconds supplied by the caller
//! and are expected to be non-decreasing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::config::RateLimitConfig;

/// In-process sliding window over admission timestamps
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Maximum admissions per window
    max_per_window: u32,

    /// Window length in seconds
    window_secs: u64,

    /// Admission timestamps, oldest first
    calls: Mutex<VecDeque<u64>>,
}

impl SlidingWindowLimiter {
    /// Create a new limiter
    pub fn new(max_per_window: u32, window_secs: u64) -> Self {
        Self {
            max_per_window,
            window_secs,
            calls: Mutex::new(VecDeque::with_capacity(max_per_window.min(1024) as usize)),
        }
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_per_minute, config.window_secs)
    }

    /// Maximum admissions per window
    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Window length in seconds
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u64>> {
        // A VecDeque is never left half-updated by a panicking holder.
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop timestamps outside the window `[now - window_secs, now]`
    fn prune(&self, calls: &mut VecDeque<u64>, now: u64) {
        while calls
            .front()
            .is_some_and(|&t| t.saturating_add(self.window_secs) < now)
        {
            calls.pop_front();
        }
    }

    /// Admit a call at `now` if the window has room, recording it
    pub fn try_admit(&self, now: u64) -> bool {
        let mut calls = self.lock();
        self.prune(&mut calls, now);

        if calls.len() < self.max_per_window as usize {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Calls recorded in the window ending at `now`
    pub fn current_count(&self, now: u64) -> u32 {
        let mut calls = self.lock();
        self.prune(&mut calls, now);
        calls.len() as u32
    }

    /// Admissions still available in the window ending at `now`
    pub fn remaining(&self, now: u64) -> u32 {
        self.max_per_window.saturating_sub(self.current_count(now))
    }

    /// Seconds until the oldest recorded call leaves the window
    ///
    /// Zero when a slot is free right now.
    pub fn seconds_until_next_slot(&self, now: u64) -> u64 {
        let mut calls = self.lock();
        self.prune(&mut calls, now);

        if calls.len() < self.max_per_window as usize {
            return 0;
        }

        calls
            .front()
            .map(|&oldest| oldest.saturating_add(self.window_secs).saturating_sub(now))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_max() {
        let limiter = SlidingWindowLimiter::new(20, 60);
        let t0 = 1_000;

        for _ in 0..20 {
            assert!(limiter.try_admit(t0));
        }
        assert!(!limiter.try_admit(t0));
        assert_eq!(limiter.current_count(t0), 20);
        assert_eq!(limiter.remaining(t0), 0);
    }

    #[test]
    fn test_retry_after_counts_down_from_oldest() {
        let limiter = SlidingWindowLimiter::new(20, 60);
        let t0 = 1_000;

        for _ in 0..20 {
            limiter.try_admit(t0);
        }
        assert_eq!(limiter.seconds_until_next_slot(t0), 60);
        assert_eq!(limiter.seconds_until_next_slot(t0 + 30), 30);
    }

    #[test]
    fn test_window_expires() {
        let limiter = SlidingWindowLimiter::new(20, 60);
        let t0 = 1_000;

        for _ in 0..20 {
            limiter.try_admit(t0);
        }

        assert!(!limiter.try_admit(t0 + 59));
        assert_eq!(limiter.seconds_until_next_slot(t0 + 59), 1);

        assert_eq!(limiter.current_count(t0 + 61), 0);
        assert!(limiter.try_admit(t0 + 61));
    }

    #[test]
    fn test_call_exactly_one_window_old_still_counts() {
        let limiter = SlidingWindowLimiter::new(20, 60);

        for _ in 0..20 {
            assert!(limiter.try_admit(1_000));
        }

        assert_eq!(limiter.current_count(1_060), 20);
        assert!(!limiter.try_admit(1_060));
        assert_eq!(limiter.seconds_until_next_slot(1_060), 0);

        assert!(limiter.try_admit(1_061));
    }

    #[test]
    fn test_next_slot_saturates_near_max_timestamp() {
        let limiter = SlidingWindowLimiter::new(1, 60);
        let near_max = u64::MAX - 10;

        assert!(limiter.try_admit(near_max));
        assert!(!limiter.try_admit(near_max));
        assert_eq!(limiter.seconds_until_next_slot(near_max), 10);
    }

    #[test]
    fn test_denied_attempt_is_not_recorded() {
        let limiter = SlidingWindowLimiter::new(1, 60);
        assert!(limiter.try_admit(10));
        assert!(!limiter.try_admit(20));
        assert!(!limiter.try_admit(30));
        assert_eq!(limiter.current_count(30), 1);
    }

    #[test]
    fn test_next_slot_zero_when_room() {
        let limiter = SlidingWindowLimiter::new(3, 60);
        assert_eq!(limiter.seconds_until_next_slot(100), 0);

        limiter.try_admit(100);
        limiter.try_admit(110);
        assert_eq!(limiter.seconds_until_next_slot(115), 0);

        limiter.try_admit(120);
        assert_eq!(limiter.seconds_until_next_slot(125), 35);
    }

    #[test]
    fn test_from_config() {
        let limiter = SlidingWindowLimiter::from_config(&RateLimitConfig::default());
        assert_eq!(limiter.max_per_window(), 20);
        assert_eq!(limiter.window_secs(), 60);
    }

    #[test]
    fn test_concurrent_admissions_respect_max() {
        use std::sync::Arc;

        let limiter = Arc::new(SlidingWindowLimiter::new(20, 60));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..10).filter(|_| limiter.try_admit(500)).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 20);
    }
}
