//! Typed HTTP client for the FixLoop backend REST API.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::domain::types::{CopilotAnswer, IncidentCard, SimulateMode, SystemStatus, TestRun};
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Request/response operations the store depends on.
///
/// Each call is independent; implementations hold no per-call state.
pub trait Backend: Send + Sync + 'static {
    fn status(&self) -> impl Future<Output = Result<SystemStatus>> + Send;

    fn current_incident(&self) -> impl Future<Output = Result<Option<IncidentCard>>> + Send;

    fn set_bug(&self, enabled: bool) -> impl Future<Output = Result<SystemStatus>> + Send;

    fn simulate_incident(
        &self,
        mode: SimulateMode,
    ) -> impl Future<Output = Result<Option<IncidentCard>>> + Send;

    fn run_tests(&self, incident_id: &str) -> impl Future<Output = Result<TestRun>> + Send;

    fn test_run(&self, run_id: &str) -> impl Future<Output = Result<TestRun>> + Send;

    fn ask(
        &self,
        incident_id: Option<&str>,
        question: &str,
    ) -> impl Future<Output = Result<CopilotAnswer>> + Send;
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    http: Client,
}

impl BackendClient {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<T, ()>(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "backend request");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(Error::Request {
            status: status.as_u16(),
            body,
        });
    }
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text)?)
}

impl Backend for BackendClient {
    async fn status(&self) -> Result<SystemStatus> {
        self.get("/api/status").await
    }

    async fn current_incident(&self) -> Result<Option<IncidentCard>> {
        self.get("/api/incidents/current").await
    }

    async fn set_bug(&self, enabled: bool) -> Result<SystemStatus> {
        self.post("/api/demo/bug", &json!({ "enabled": enabled }))
            .await
    }

    async fn simulate_incident(&self, mode: SimulateMode) -> Result<Option<IncidentCard>> {
        self.post("/api/incidents/simulate", &json!({ "mode": mode }))
            .await
    }

    async fn run_tests(&self, incident_id: &str) -> Result<TestRun> {
        self.post("/api/tests/run", &json!({ "incident_id": incident_id }))
            .await
    }

    async fn test_run(&self, run_id: &str) -> Result<TestRun> {
        self.get(&format!("/api/tests/runs/{}", run_id)).await
    }

    async fn ask(&self, incident_id: Option<&str>, question: &str) -> Result<CopilotAnswer> {
        self.post(
            "/api/copilot/ask",
            &json!({ "incident_id": incident_id, "question": question }),
        )
        .await
    }
}
