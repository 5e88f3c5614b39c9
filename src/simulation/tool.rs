//! Fan-out calls to the sibling tool endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::config::FanoutConfig;
use crate::error::{FanoutError, ServerError};
use crate::metrics;

/// Target of remote fan-out calls.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Name for metrics/logging.
    fn name(&self) -> &'static str;

    /// Ask the tool to burn `cpu_spin_ms` of CPU.
    async fn call(&self, cpu_spin_ms: i64) -> Result<(), FanoutError>;
}

/// Calls `POST /tool` on a configured URL.
pub struct HttpToolCaller {
    client: Client,
    url: String,
}

impl HttpToolCaller {
    pub fn new(config: &FanoutConfig) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServerError::Config(format!("Failed to build tool client: {}", e)))?;

        Ok(Self {
            client,
            url: config.tool_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ToolCaller for HttpToolCaller {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn call(&self, cpu_spin_ms: i64) -> Result<(), FanoutError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "cpu_spin_ms": cpu_spin_ms }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FanoutError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Perform one fan-out call and discard its outcome.
pub async fn call_best_effort(tool: &dyn ToolCaller, cpu_spin_ms: i64) {
    match tool.call(cpu_spin_ms).await {
        Ok(()) => metrics::record_fanout_call(tool.name(), "ok"),
        Err(e) => {
            tracing::debug!(tool = tool.name(), error = %e, "Fan-out call failed, ignoring");
            metrics::record_fanout_call(tool.name(), "error");
        }
    }
}
