//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use synthetic_llm_server::binding::Binding;
use synthetic_llm_server::config::{FanoutConfig, SimulationDefaults};
use synthetic_llm_server::error::FanoutError;
use synthetic_llm_server::server::{build_router, AppState, HttpListener};
use synthetic_llm_server::shutdown::ShutdownCoordinator;
use synthetic_llm_server::simulation::{HttpToolCaller, ToolCaller};

/// Where fan-out calls of a test server go.
pub enum ToolTarget {
    /// A closed local port.
    Unreachable,
    /// The server's own `/tool` route.
    SelfTool,
    /// A test double.
    Custom(Arc<dyn ToolCaller>),
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: ShutdownCoordinator,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

/// Serve the router on an ephemeral localhost port.
pub async fn start_server(
    binding: Binding,
    defaults: SimulationDefaults,
    target: ToolTarget,
    gzip: bool,
) -> TestServer {
    let shutdown = ShutdownCoordinator::new();
    let listener = HttpListener::bind("127.0.0.1:0".parse().unwrap(), shutdown.clone())
        .await
        .unwrap();
    let addr = listener.local_addr();

    let tool: Arc<dyn ToolCaller> = match target {
        ToolTarget::Unreachable => Arc::new(http_tool("http://127.0.0.1:9/tool".to_string())),
        ToolTarget::SelfTool => Arc::new(http_tool(format!("http://{}/tool", addr))),
        ToolTarget::Custom(tool) => tool,
    };

    let state = Arc::new(AppState {
        defaults,
        binding,
        tool,
        shutdown: shutdown.clone(),
        stream_buffer: 4,
    });
    tokio::spawn(listener.serve(build_router(state, gzip)));

    TestServer { addr, shutdown }
}

fn http_tool(url: String) -> HttpToolCaller {
    HttpToolCaller::new(&FanoutConfig {
        tool_url: url,
        timeout_secs: 2,
    })
    .unwrap()
}

/// Split an SSE body into the payloads of its `data:` records.
///
/// Panics if the body is not a sequence of well-formed records.
pub fn sse_payloads(body: &str) -> Vec<String> {
    assert!(body.ends_with("\n\n"), "body must end with a blank line: {:?}", body);
    body.split_terminator("\n\n")
        .map(|record| {
            record
                .strip_prefix("data: ")
                .unwrap_or_else(|| panic!("record without data prefix: {:?}", record))
                .to_string()
        })
        .collect()
}

/// Content of every delta payload, in order.
pub fn delta_contents(payloads: &[String]) -> Vec<String> {
    payloads
        .iter()
        .filter(|p| p.as_str() != "[DONE]")
        .filter_map(|p| {
            let value: Value = serde_json::from_str(p).unwrap();
            value["choices"][0]["delta"]["content"]
                .as_str()
                .map(str::to_string)
        })
        .collect()
}

/// Tool double that counts calls and can be told to fail or panic.
pub struct RecordingTool {
    pub calls: std::sync::atomic::AtomicUsize,
    pub behavior: ToolBehavior,
}

#[derive(Clone, Copy)]
pub enum ToolBehavior {
    Succeed,
    Fail,
    Panic,
}

impl RecordingTool {
    pub fn new(behavior: ToolBehavior) -> Arc<Self> {
        Arc::new(Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
            behavior,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolCaller for RecordingTool {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn call(&self, _cpu_spin_ms: i64) -> Result<(), FanoutError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match self.behavior {
            ToolBehavior::Succeed => Ok(()),
            ToolBehavior::Fail => Err(FanoutError::Status(503)),
            ToolBehavior::Panic => panic!("tool exploded"),
        }
    }
}

/// Defaults with no pacing, so tests only wait for what they ask for.
pub fn fast_defaults() -> SimulationDefaults {
    SimulationDefaults {
        frames: 3,
        delay_ms: 0,
        ..SimulationDefaults::default()
    }
}
