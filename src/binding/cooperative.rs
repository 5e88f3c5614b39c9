//! Cooperative binding: the script runs inside the response body stream.

use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::FutureExt;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::StreamFault;
use crate::metrics;
use crate::shutdown::StreamGuard;
use crate::simulation::{busy_wait, call_best_effort, Script, SimulationParams, Step, ToolCaller};
use crate::streaming::sse;

struct CooperativeDriver {
    script: Script,
    tool: Arc<dyn ToolCaller>,
    _guard: StreamGuard,
}

impl CooperativeDriver {
    /// Run steps until the next event and return it encoded.
    async fn next_record(&mut self) -> Option<Bytes> {
        loop {
            let step = self.script.next()?;
            if let Step::Emit(event) = step {
                let record = sse::encode(&event);
                metrics::record_event_sent(&event, record.len());
                return Some(record);
            }

            let result = AssertUnwindSafe(run_step(step, self.tool.as_ref()))
                .catch_unwind()
                .await;
            if let Err(panic) = result {
                let fault = StreamFault::from_panic(panic);
                tracing::warn!(error = %fault, "Stream fault, ending with error frame");
                metrics::record_stream_fault();
                self.script.fail(fault.to_string());
            }
        }
    }
}

async fn run_step(step: Step, tool: &dyn ToolCaller) {
    match step {
        Step::Suspend(duration) => tokio::time::sleep(duration).await,
        Step::Spin(duration) => busy_wait(duration),
        Step::CallTool { cpu_spin_ms } => call_best_effort(tool, cpu_spin_ms).await,
        Step::Emit(_) => {}
    }
}

/// Stream the simulated response on the current task.
///
/// Nothing runs until the body is first polled; each poll advances the
/// script up to the next event.
pub fn event_stream(
    params: SimulationParams,
    tool: Arc<dyn ToolCaller>,
    guard: StreamGuard,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let driver = CooperativeDriver {
        script: Script::new(params),
        tool,
        _guard: guard,
    };

    stream::unfold(driver, |mut driver| async move {
        let record = driver.next_record().await?;
        Some((Ok(record), driver))
    })
}
