//! Background polling workers (C8, C9).
//!
//! Both share `freeq-server::server::Server::run`'s "single long-running
//! task, configurable interval, feature flag checked per tick" skeleton
//! for its periodic maintenance tasks.
//! Cadence and the enabled flag are read fresh each tick so tests can drive
//! a single iteration deterministically via `tick()` instead of the timer.

pub mod crosspost;
pub mod peer_review;
