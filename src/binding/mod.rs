//! Concurrency bindings that drive a [`Script`](crate::simulation::Script).
//!
//! Both bindings run the same step sequence and only differ in how a
//! suspension, a spin and a tool call are carried out:
//!
//! - `cooperative`: one async task per request on the shared runtime;
//!   suspensions yield to the scheduler, spins block the worker.
//! - `threaded`: one OS thread per request; every wait blocks that thread.

mod cooperative;
mod threaded;

pub use cooperative::event_stream;
pub use threaded::spawn_event_stream;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use crate::shutdown::StreamGuard;
use crate::simulation::{busy_wait_ms, SimulationParams, ToolCaller};

/// Stream of encoded SSE records, ready to be used as a response body.
pub type RecordStream = BoxStream<'static, Result<Bytes, Infallible>>;

/// How requests are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    Cooperative,
    Threaded,
}

impl Binding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Binding::Cooperative => "cooperative",
            Binding::Threaded => "threaded",
        }
    }

    /// Start streaming one simulated response.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open_stream(
        self,
        params: SimulationParams,
        tool: Arc<dyn ToolCaller>,
        guard: StreamGuard,
        buffer: usize,
    ) -> RecordStream {
        match self {
            Binding::Cooperative => event_stream(params, tool, guard).boxed(),
            Binding::Threaded => spawn_event_stream(
                params,
                tool,
                tokio::runtime::Handle::current(),
                guard,
                buffer,
            ),
        }
    }

    /// Busy-wait for the tool endpoint.
    ///
    /// The cooperative binding spins on the runtime worker itself; the
    /// threaded binding hands the spin to the blocking pool.
    pub async fn spin(self, ms: i64) -> Result<(), String> {
        match self {
            Binding::Cooperative => {
                busy_wait_ms(ms);
                Ok(())
            }
            Binding::Threaded => tokio::task::spawn_blocking(move || busy_wait_ms(ms))
                .await
                .map_err(|e| e.to_string()),
        }
    }
}

impl FromStr for Binding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cooperative" | "async" => Ok(Binding::Cooperative),
            "threaded" | "thread" => Ok(Binding::Threaded),
            other => Err(format!(
                "Unknown binding: {}. Available: cooperative, threaded",
                other
            )),
        }
    }
}
