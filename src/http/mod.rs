//! HTTP adapter: axum middleware and a small server around it.

mod middleware;
mod server;

pub use middleware::{
    rate_limit, RateLimitState, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::{router, HttpServer};
