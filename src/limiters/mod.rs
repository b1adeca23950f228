pub mod serving_counter;
pub use serving_counter::{counter_key, RateDecision, RateLimiter, ResetSummary};
