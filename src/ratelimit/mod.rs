//! Fixed-window rate limiting logic.

pub(crate) mod backend;
mod decision;
mod key;
mod limiter;
pub mod window;

pub use backend::CounterBackend;
pub use decision::Decision;
pub use key::BackendKey;
pub use limiter::{Policy, RateLimiter};
pub use window::{Clock, ManualClock, SystemClock, Window};
