//! Yarl - fixed-window rate limiting
//!
//! For an arbitrary key (client IP, user id, API token) Yarl decides whether
//! one more operation fits under an "N requests per window" policy, and
//! reports how many requests remain and when the window resets. Counts live
//! in a pluggable counter store: a bounded in-memory LRU cache, or Redis.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
