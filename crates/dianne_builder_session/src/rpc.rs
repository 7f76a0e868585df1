// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC 2.0 client for the DIANNE job and platform API.

use crate::error::{RpcError, RpcResult};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Protocol version sent with every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Delivers one request document and returns the response document
pub trait RpcTransport: Send + Sync {
    /// Post a request
    fn post(&self, request: Value) -> BoxFuture<'_, RpcResult<Value>>;
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: i64,
    message: String,
}

/// JSON-RPC client with one method per remote call
pub struct DianneRpc {
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl DianneRpc {
    /// Create a client with the default timeout
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self::with_timeout(transport, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom timeout
    pub fn with_timeout(transport: Arc<dyn RpcTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(0),
            timeout,
        }
    }

    /// Call a method. Ids increase monotonically from zero; `params` is
    /// omitted from the request when `None`.
    pub async fn call(&self, method: &str, params: Option<Value>) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }

        tracing::debug!("JSON-RPC call {method} #{id}");
        let response = tokio::time::timeout(self.timeout, self.transport.post(request))
            .await
            .map_err(|_| RpcError::Timeout {
                method: method.to_string(),
            })??;

        let response: Response = serde_json::from_value(response)
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
        if let Some(error) = response.error {
            tracing::warn!("JSON-RPC {method} failed: {}", error.message);
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        // the server may echo the id back as a string
        let matches = response.id.as_u64() == Some(id)
            || response.id.as_str() == Some(id.to_string().as_str());
        if !matches {
            return Err(RpcError::InvalidResponse(format!(
                "expected id {id}, got {}",
                response.id
            )));
        }
        Ok(response.result)
    }

    /// Submit a learn job
    pub async fn learn(&self, nn: &str, dataset: &str, properties: Value) -> RpcResult<Value> {
        self.call("learn", Some(json!([nn, dataset, properties]))).await
    }

    /// Submit an evaluation job
    pub async fn eval(&self, nn: &str, dataset: &str, properties: Value) -> RpcResult<Value> {
        self.call("eval", Some(json!([nn, dataset, properties]))).await
    }

    /// Submit an agent job
    pub async fn act(&self, nn: &str, dataset: &str, properties: Value) -> RpcResult<Value> {
        self.call("act", Some(json!([nn, dataset, properties]))).await
    }

    /// Result of a learn job
    pub async fn learn_result(&self, job_id: &str) -> RpcResult<Value> {
        self.call("learnResult", Some(json!([job_id]))).await
    }

    /// Result of an evaluation job
    pub async fn evaluation_result(&self, job_id: &str) -> RpcResult<Value> {
        self.call("evaluationResult", Some(json!([job_id]))).await
    }

    /// Result of an agent job
    pub async fn agent_result(&self, job_id: &str) -> RpcResult<Value> {
        self.call("agentResult", Some(json!([job_id]))).await
    }

    /// Job description
    pub async fn job(&self, job_id: &str) -> RpcResult<Value> {
        self.call("job", Some(json!([job_id]))).await
    }

    /// Neural networks known to the platform
    pub async fn available_neural_networks(&self) -> RpcResult<Value> {
        self.call("availableNeuralNetworks", None).await
    }

    /// Datasets known to the platform
    pub async fn available_datasets(&self) -> RpcResult<Value> {
        self.call("availableDatasets", None).await
    }

    /// Jobs waiting for resources
    pub async fn queued_jobs(&self) -> RpcResult<Value> {
        self.call("queuedJobs", None).await
    }

    /// Jobs in progress
    pub async fn running_jobs(&self) -> RpcResult<Value> {
        self.call("runningJobs", None).await
    }

    /// Completed jobs
    pub async fn finished_jobs(&self) -> RpcResult<Value> {
        self.call("finishedJobs", None).await
    }

    /// Platform notifications
    pub async fn notifications(&self) -> RpcResult<Value> {
        self.call("notifications", None).await
    }

    /// Platform status
    pub async fn status(&self) -> RpcResult<Value> {
        self.call("status", None).await
    }

    /// Devices attached to the platform
    pub async fn devices(&self) -> RpcResult<Value> {
        self.call("devices", None).await
    }
}

impl fmt::Debug for DianneRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DianneRpc")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("timeout", &self.timeout)
            .finish()
    }
}
