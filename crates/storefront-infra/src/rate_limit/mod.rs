//! Rate limiting algorithms over a shared counter store.

mod engine;
mod fixed_window;
mod sliding_window;
mod token_bucket;

pub use engine::LimiterEngine;
