//! Fakes and fixtures shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::Backend;
use crate::domain::types::{
    CopilotAnswer, IncidentCard, SimulateMode, StatusKind, SystemStatus, TestRun,
};
use crate::error::{Error, Result};
use crate::transport::{Connector, FrameStream};

// ── Fixtures ───────────────────────────────────────────

pub fn status(kind: StatusKind, error_rate: f64, p95: f64) -> SystemStatus {
    SystemStatus {
        status: kind,
        error_rate_5m: error_rate,
        p95_latency_ms_5m: p95,
        active_incident_id: None,
        updated_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

pub fn incident_json(incident_id: &str) -> Value {
    json!({
        "incident_id": incident_id,
        "title": "Checkout error spike",
        "detected_at": "2025-01-01T00:00:00Z",
        "datadog_summary": {
            "monitor_id": "m-1",
            "service": "demo-checkout",
            "signal": { "error_rate_5m": 12.4, "p95_latency_ms_5m": 870.0, "top_error": "KeyError: 'sku'" },
            "evidence_links": [{ "label": "monitor", "url": "https://app.datadoghq.com/monitors/1" }]
        }
    })
}

pub fn incident(incident_id: &str) -> IncidentCard {
    serde_json::from_value(incident_json(incident_id)).unwrap()
}

pub fn plan_json(plan_id: &str, tests: &[&str]) -> Value {
    let items: Vec<Value> = tests
        .iter()
        .enumerate()
        .map(|(i, id)| {
            json!({
                "test_id": id,
                "name": format!("check {id}"),
                "type": "API",
                "priority": i + 1,
                "what_it_checks": "checkout succeeds",
                "target": { "method": "POST", "url": "http://demo/checkout", "headers": {}, "body_json": { "sku": "A1" } },
                "pass_criteria": "status == 200"
            })
        })
        .collect();
    json!({ "plan_id": plan_id, "generated_at": "2025-01-01T00:00:05Z", "items": items })
}

pub fn run_json(run_id: &str, status: &str, tests: &[(&str, &str)]) -> Value {
    let tests: Vec<Value> = tests
        .iter()
        .map(|(id, st)| {
            json!({ "test_id": id, "name": format!("check {id}"), "status": st, "last_update_at": "2025-01-01T00:00:10Z", "details": null })
        })
        .collect();
    json!({
        "run_id": run_id,
        "incident_id": "inc-1",
        "started_at": "2025-01-01T00:00:06Z",
        "status": status,
        "tests": tests
    })
}

pub fn run(run_id: &str, status: &str, tests: &[(&str, &str)]) -> TestRun {
    serde_json::from_value(run_json(run_id, status, tests)).unwrap()
}

pub fn frame(kind: &str, payload: Value) -> String {
    json!({ "type": kind, "payload": payload, "ts": "2025-01-01T00:00:00Z" }).to_string()
}

// ── Backend ────────────────────────────────────────────

/// How a faked operation fails.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Network,
    Status(u16),
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Network => Error::Transport("network error".to_string()),
            Failure::Status(status) => Error::Request {
                status,
                body: "boom".to_string(),
            },
        }
    }
}

/// In-memory backend. Operation names match the `Backend` method names.
pub struct FakeBackend {
    pub status: SystemStatus,
    pub incident: Option<IncidentCard>,
    pub failures: HashMap<&'static str, Failure>,
    pub delays: HashMap<&'static str, Duration>,
    /// Per-call delays for `ask`, consumed in call order.
    pub ask_delays: Mutex<VecDeque<Duration>>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            status: status(StatusKind::Healthy, 0.2, 120.0),
            incident: None,
            failures: HashMap::new(),
            delays: HashMap::new(),
            ask_delays: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn failing(mut self, op: &'static str, failure: Failure) -> Self {
        self.failures.insert(op, failure);
        self
    }

    pub fn delayed(mut self, op: &'static str, delay: Duration) -> Self {
        self.delays.insert(op, delay);
        self
    }

    pub fn with_incident(mut self, incident: IncidentCard) -> Self {
        self.incident = Some(incident);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, op: &'static str, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let delay = if op == "ask" {
            self.ask_delays.lock().unwrap().pop_front()
        } else {
            self.delays.get(op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.get(op) {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

impl Backend for FakeBackend {
    async fn status(&self) -> Result<SystemStatus> {
        self.enter("status", "status".into()).await?;
        Ok(self.status.clone())
    }

    async fn current_incident(&self) -> Result<Option<IncidentCard>> {
        self.enter("current_incident", "current_incident".into())
            .await?;
        Ok(self.incident.clone())
    }

    async fn set_bug(&self, enabled: bool) -> Result<SystemStatus> {
        self.enter("set_bug", format!("set_bug {enabled}")).await?;
        Ok(if enabled {
            status(StatusKind::IncidentActive, 12.4, 870.0)
        } else {
            status(StatusKind::Healthy, 0.1, 110.0)
        })
    }

    async fn simulate_incident(&self, mode: SimulateMode) -> Result<Option<IncidentCard>> {
        self.enter("simulate_incident", format!("simulate_incident {mode:?}"))
            .await?;
        Ok(match mode {
            SimulateMode::IncidentOn => Some(incident("inc-sim")),
            SimulateMode::IncidentOff => None,
        })
    }

    async fn run_tests(&self, incident_id: &str) -> Result<TestRun> {
        self.enter("run_tests", format!("run_tests {incident_id}"))
            .await?;
        Ok(run("r1", "QUEUED", &[("t1", "PENDING"), ("t2", "PENDING")]))
    }

    async fn test_run(&self, run_id: &str) -> Result<TestRun> {
        self.enter("test_run", format!("test_run {run_id}")).await?;
        Ok(run(run_id, "COMPLETED", &[("t1", "PASS"), ("t2", "PASS")]))
    }

    async fn ask(&self, incident_id: Option<&str>, question: &str) -> Result<CopilotAnswer> {
        self.enter("ask", format!("ask {incident_id:?} {question}"))
            .await?;
        Ok(CopilotAnswer {
            incident_id: incident_id.map(str::to_string),
            question: question.to_string(),
            answer: format!("answer to {question}"),
            citations: Vec::new(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        })
    }
}

// ── Connector ──────────────────────────────────────────

pub enum Script {
    Fail,
    /// Open, then yield frames from the receiver until its sender drops.
    Open(mpsc::UnboundedReceiver<Result<String>>),
}

pub fn open_stream() -> (Script, mpsc::UnboundedSender<Result<String>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Script::Open(rx), tx)
}

/// Plays a fixed script of connection outcomes, failing once it runs out.
/// Every attempt's start time is reported on the returned receiver.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Script>>,
    attempts: mpsc::UnboundedSender<Instant>,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Script>) -> (Self, mpsc::UnboundedReceiver<Instant>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Mutex::new(script.into()),
                attempts: tx,
            },
            rx,
        )
    }
}

impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<FrameStream> {
        let _ = self.attempts.send(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Open(rx)) => Ok(futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|frame| (frame, rx))
            })
            .boxed()),
            Some(Script::Fail) | None => Err(Error::Transport("connection refused".into())),
        }
    }
}
