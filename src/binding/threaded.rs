//! Thread-per-request binding: the script runs on a dedicated OS thread.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::RecordStream;
use crate::error::StreamFault;
use crate::metrics;
use crate::shutdown::StreamGuard;
use crate::simulation::{
    busy_wait, call_best_effort, Script, SimulationParams, Step, StreamEvent, ToolCaller,
};
use crate::streaming::sse;

/// Spawn a worker thread for one request and stream what it emits.
///
/// Records travel through a bounded channel; the worker stops as soon as the
/// receiving side is dropped. If the thread cannot be spawned the stream
/// carries a single error frame and the terminal marker.
pub fn spawn_event_stream(
    params: SimulationParams,
    tool: Arc<dyn ToolCaller>,
    handle: Handle,
    guard: StreamGuard,
    buffer: usize,
) -> RecordStream {
    let (tx, rx) = mpsc::channel::<Bytes>(buffer.max(1));
    let name = format!("sim-stream-{}", guard.id());

    let spawned = std::thread::Builder::new().name(name).spawn(move || {
        let _guard = guard;
        drive(Script::new(params), tool.as_ref(), &handle, &tx);
    });

    if let Err(e) = spawned {
        let fault = StreamFault::Worker(e.to_string());
        tracing::warn!(error = %fault, "Failed to spawn stream worker");
        metrics::record_stream_fault();
        let records = [
            sse::encode(&StreamEvent::error(fault.to_string())),
            sse::encode(&StreamEvent::Done),
        ];
        return stream::iter(records.map(Ok::<Bytes, Infallible>)).boxed();
    }

    stream::unfold(rx, |mut rx| async move {
        let record = rx.recv().await?;
        Some((Ok::<Bytes, Infallible>(record), rx))
    })
    .boxed()
}

fn drive(mut script: Script, tool: &dyn ToolCaller, handle: &Handle, tx: &mpsc::Sender<Bytes>) {
    while let Some(step) = script.next() {
        if let Step::Emit(event) = step {
            let record = sse::encode(&event);
            let len = record.len();
            if tx.blocking_send(record).is_err() {
                tracing::debug!("Client went away, stopping stream worker");
                return;
            }
            metrics::record_event_sent(&event, len);
            continue;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| run_step(step, tool, handle)));
        if let Err(payload) = result {
            let fault = StreamFault::from_panic(payload);
            tracing::warn!(error = %fault, "Stream fault, ending with error frame");
            metrics::record_stream_fault();
            script.fail(fault.to_string());
        }
    }
}

fn run_step(step: Step, tool: &dyn ToolCaller, handle: &Handle) {
    match step {
        Step::Suspend(duration) => std::thread::sleep(duration),
        Step::Spin(duration) => busy_wait(duration),
        Step::CallTool { cpu_spin_ms } => handle.block_on(call_best_effort(tool, cpu_spin_ms)),
        Step::Emit(_) => {}
    }
}
