//! HTTP server

pub mod http;
pub mod limiter;

pub use http::{run, AppState};
pub use limiter::TokenBucket;
