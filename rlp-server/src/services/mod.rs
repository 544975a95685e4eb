//! Outbound integrations and background work
//!
//! Every integration is optional. Notifications are fire-and-forget: a
//! failed webhook or email is logged and never fails the request that
//! caused it.

pub mod digest;
pub mod discord;
pub mod email;
pub mod notifier;
pub mod openai;
pub mod playht;
pub mod retry;
pub mod scheduler;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

pub use notifier::Notifier;

/// Direct (unkeyed) limiter shared by the integration clients
pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiter allowing `per_second` requests per second
pub(crate) fn rate_limiter(per_second: u32) -> DirectRateLimiter {
    let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rate))
}

pub(crate) const USER_AGENT: &str = concat!("rlp-server/", env!("CARGO_PKG_VERSION"));

/// HTTP client with the platform user agent and a request timeout
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
}
