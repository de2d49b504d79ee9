pub mod client;
pub mod rate_limit;

pub use client::{BinanceClient, FetchError};
pub use rate_limit::RateLimitTracker;
