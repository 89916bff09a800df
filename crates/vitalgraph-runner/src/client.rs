//! Wire types and the REST client for the execution backend.
//!
//! Field names follow the backend's camelCase JSON. The run boundary streams
//! newline-delimited JSON frames: zero or more `log` frames followed by one
//! terminal `done` frame.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vitalgraph_core::config::BackendConfig;
use vitalgraph_core::error::{Result, VitalError};
use vitalgraph_core::types::{AgentId, LogEntry, WorkflowId};
use vitalgraph_editor::registry::Agent;
use vitalgraph_editor::Workflow;

/// Request body for a single-agent test invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub agent_id: AgentId,
    /// Resolved variables; placeholder-marked entries are already stripped.
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub enable_web_search: bool,
}

/// Synchronous response from the test boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponse {
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
}

/// Terminal result of a whole-workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// One frame from the run stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunStreamItem {
    Log { entry: LogEntry },
    Done { result: RunResult },
}

/// Data the backend uses to fill auto-injected variables for one context key
/// (e.g. an ISO country code). The editor only displays this; the resolver
/// never performs the fill itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub context_key: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

/// The execution backend boundary.
///
/// Implemented by `ApiClient` in production and by scripted mocks in tests.
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Single-shot agent test; no streaming.
    fn test(&self, request: TestRequest) -> BoxFuture<'_, Result<TestResponse>>;

    /// Whole-workflow run: a stream of log frames ending in a terminal
    /// result frame. The transport owns ordering; consumers append only.
    fn run(
        &self,
        workflow_id: WorkflowId,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<RunStreamItem>>>>;

    /// Context lookup boundary, keyed by e.g. an ISO country code.
    fn fetch_context(&self, context_key: &str) -> BoxFuture<'_, Result<ContextSnapshot>>;
}

/// REST client for the execution backend.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(ref token) = self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Map an HTTP response onto the error taxonomy.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            400 | 422 => VitalError::Validation(body),
            404 => VitalError::NotFound(body),
            409 => VitalError::Conflict(body),
            500..=599 => VitalError::Execution(body),
            _ => VitalError::Transport(format!("unexpected status {}: {}", status, body)),
        })
    }

    // Agent CRUD boundary

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let response = self
            .request(reqwest::Method::GET, "api/agents")
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    pub async fn create_agent(&self, agent: &Agent) -> Result<Agent> {
        let response = self
            .request(reqwest::Method::POST, "api/agents")
            .json(agent)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    pub async fn update_agent(&self, agent: &Agent) -> Result<Agent> {
        let response = self
            .request(reqwest::Method::PUT, &format!("api/agents/{}", agent.id))
            .json(agent)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    pub async fn delete_agent(&self, id: &AgentId) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("api/agents/{}", id))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    // Workflow CRUD boundary

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let response = self
            .request(reqwest::Method::GET, "api/workflows")
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<Workflow> {
        let response = self
            .request(reqwest::Method::PUT, &format!("api/workflows/{}", workflow.id))
            .json(workflow)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?.json().await.map_err(transport)
    }

    pub async fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("api/workflows/{}", id))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

fn transport(e: reqwest::Error) -> VitalError {
    VitalError::Transport(e.to_string())
}

impl ExecutionBackend for ApiClient {
    fn test(&self, request: TestRequest) -> BoxFuture<'_, Result<TestResponse>> {
        Box::pin(async move {
            debug!(agent_id = %request.agent_id, variables = request.variables.len(), "Dispatching test");
            let response = self
                .request(reqwest::Method::POST, "api/test")
                .json(&request)
                .send()
                .await
                .map_err(transport)?;
            Self::check(response).await?.json().await.map_err(transport)
        })
    }

    fn run(
        &self,
        workflow_id: WorkflowId,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<RunStreamItem>>>> {
        Box::pin(async move {
            debug!(workflow_id = %workflow_id, "Dispatching run");
            let response = self
                .request(
                    reqwest::Method::POST,
                    &format!("api/workflows/{}/run", workflow_id),
                )
                .send()
                .await
                .map_err(transport)?;
            let response = Self::check(response).await?;
            let stream = NdjsonStream::new(response.bytes_stream());
            Ok(stream.boxed())
        })
    }

    fn fetch_context(&self, context_key: &str) -> BoxFuture<'_, Result<ContextSnapshot>> {
        let path = format!("api/context/{}", context_key);
        Box::pin(async move {
            let response = self
                .request(reqwest::Method::GET, &path)
                .send()
                .await
                .map_err(transport)?;
            Self::check(response).await?.json().await.map_err(transport)
        })
    }
}

/// Parse a raw byte stream into newline-delimited JSON frames.
///
/// Buffers raw bytes and only decodes complete lines: a multi-byte character
/// split across transport chunks reassembles before UTF-8 decoding.
#[derive(Default)]
pub struct NdjsonParser {
    buffer: BytesMut,
}

impl NdjsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and extract complete frames.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<RunStreamItem>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            frames.push(serde_json::from_str::<RunStreamItem>(line).map_err(VitalError::from));
        }

        frames
    }
}

/// A stream of run frames from raw response bytes.
pub struct NdjsonStream<S> {
    inner: S,
    parser: NdjsonParser,
    pending: Vec<Result<RunStreamItem>>,
}

impl<S> NdjsonStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: NdjsonParser::new(),
            pending: Vec::new(),
        }
    }
}

impl<S> Stream for NdjsonStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<RunStreamItem>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Return pending frames first
        if !this.pending.is_empty() {
            return Poll::Ready(Some(this.pending.remove(0)));
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                let mut frames = this.parser.feed(&bytes);
                if frames.is_empty() {
                    // Need more data, wake again
                    cx.waker().wake_by_ref();
                    Poll::Pending
                } else {
                    let first = frames.remove(0);
                    this.pending = frames;
                    Poll::Ready(Some(first))
                }
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(transport(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
