pub mod app;
pub mod backfill;
pub mod clock;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod sampler;
pub mod sink;
pub mod streaming;
pub mod usage_model;
pub mod validate;

#[cfg(test)]
mod testing;

pub use streaming::{StreamSettings, StreamingLoop};
pub use usage_model::UsageModel;
