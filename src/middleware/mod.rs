pub mod cors;
pub mod rate_limiting;

pub use cors::cors_layer;
pub use rate_limiting::{rate_limit_middleware, RateLimitDecision, RateLimiter};
