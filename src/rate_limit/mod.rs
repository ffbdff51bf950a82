//! Rate Limiting and Budget Module
//!
//! Guards a metered upstream API with two independent limits: a short
//! sliding window held in process memory and a calendar-month budget held in
//! a shared counter store so it survives restarts and is shared by replicas.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Access Gate                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐      ┌──────────────────────┐     │
//! │  │ Sliding Window       │ then │ Period Budget        │     │
//! │  │ (20 / 60s, local)    │      │ (500 / month)        │     │
//! │  └──────────────────────┘      └──────────┬───────────┘     │
//! ├───────────────────────────────────────────┼─────────────────┤
//! │                           ┌───────────────▼─────────────┐   │
//! │                           │ Counter Store (Redis/Memory) │   │
//! │                           └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`UsageReporter`] reads both limits without consuming either.

pub mod budget;
pub mod config;
pub mod gate;
pub mod reporter;
pub mod store;
pub mod window;

#[cfg(test)]
mod proptests;

pub use budget::PeriodBudget;
pub use config::RateLimitConfig;
pub use gate::{AccessGate, Admission, DenialReason};
pub use reporter::{UsageReporter, UsageSnapshot};
pub use store::{CounterStore, MemoryCounterStore, RedisCounterStore};
pub use window::SlidingWindowLimiter;
