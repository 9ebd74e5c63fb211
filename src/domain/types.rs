//! Backend-owned value types. The console copies and replaces these wholesale,
//! it never edits them field by field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Healthy,
    IncidentActive,
    Validating,
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: StatusKind,
    pub error_rate_5m: f64,
    pub p95_latency_ms_5m: f64,
    #[serde(default)]
    pub active_incident_id: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body_json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanItemKind {
    Api,
    Ui,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub test_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PlanItemKind,
    /// Lower runs earlier.
    pub priority: i64,
    pub what_it_checks: String,
    pub target: Target,
    pub pass_criteria: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub generated_at: String,
    #[serde(default)]
    pub items: Vec<PlanItem>,
}

impl Plan {
    /// A plan is ready to run once the backend has proposed at least one check.
    pub fn is_ready(&self) -> bool {
        !self.items.is_empty()
    }

    /// Items in execution order. Ties keep the order the backend sent.
    pub fn sorted_items(&self) -> Vec<&PlanItem> {
        let mut items: Vec<&PlanItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.priority);
        items
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub error_rate_5m: f64,
    pub p95_latency_ms_5m: f64,
    #[serde(default)]
    pub top_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    #[serde(default)]
    pub monitor_id: Option<String>,
    pub service: String,
    pub signal: Signal,
    #[serde(default)]
    pub evidence_links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCard {
    pub incident_id: String,
    pub title: String,
    pub detected_at: String,
    #[serde(rename = "datadog_summary")]
    pub summary: DiagnosticSummary,
    #[serde(default)]
    pub plan: Option<Plan>,
}

impl IncidentCard {
    pub fn plan_ready(&self) -> bool {
        self.plan.as_ref().is_some_and(Plan::is_ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pending,
    Running,
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub name: String,
    pub status: TestStatus,
    #[serde(default)]
    pub last_update_at: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub run_id: String,
    #[serde(default)]
    pub incident_id: String,
    #[serde(default)]
    pub started_at: String,
    pub status: RunStatus,
    #[serde(default)]
    pub tests: Vec<TestResult>,
}

impl TestRun {
    pub fn passed(&self) -> usize {
        self.tests
            .iter()
            .filter(|t| t.status == TestStatus::Pass)
            .count()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopilotAnswer {
    #[serde(default)]
    pub incident_id: Option<String>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Link>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub citations: Vec<Link>,
    pub ts: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            citations: Vec::new(),
            ts: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            citations: Vec::new(),
            ts: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl From<CopilotAnswer> for ChatMessage {
    fn from(answer: CopilotAnswer) -> Self {
        Self {
            role: Role::Assistant,
            content: answer.answer,
            citations: answer.citations,
            ts: answer.created_at,
        }
    }
}

/// Mode accepted by `POST /api/incidents/simulate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulateMode {
    IncidentOn,
    IncidentOff,
}
