//! Synthetic streaming LLM workload server.
//!
//! Reproduces the externally visible timing of a streaming inference server
//! (frame cadence, CPU contention, pre-stream fan-out) from a handful of
//! numeric knobs, under either a cooperative or a thread-per-request
//! concurrency model.

pub mod binding;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod simulation;
pub mod streaming;

pub use binding::Binding;
pub use config::Config;
pub use error::{Result, ServerError};
