//! Push-channel frames.
//!
//! Every frame is `{ "type": ..., "payload": ..., "ts": ... }`. The `type` tag
//! selects the payload shape; tags this build does not know about decode to
//! [`PushMessage::Unknown`] rather than failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::types::{CopilotAnswer, IncidentCard, Plan, SystemStatus, TestRun};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    ts: Option<String>,
}

/// Payload of `plan.generated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanUpdate {
    #[serde(default)]
    pub incident_id: Option<String>,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    SystemStatus(SystemStatus),
    IncidentCreated(IncidentCard),
    PlanGenerated(PlanUpdate),
    TestsUpdated(TestRun),
    CopilotAnswer(CopilotAnswer),
    Unknown { kind: String },
}

impl PushMessage {
    pub const SYSTEM_STATUS: &'static str = "system.status";
    pub const INCIDENT_CREATED: &'static str = "incident.created";
    pub const PLAN_GENERATED: &'static str = "plan.generated";
    pub const TESTS_UPDATED: &'static str = "tests.updated";
    pub const COPILOT_ANSWER: &'static str = "copilot.answer";

    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        tracing::trace!(kind = %envelope.kind, ts = ?envelope.ts, "decoding push frame");

        let payload = envelope.payload;
        let message = match envelope.kind.as_str() {
            Self::SYSTEM_STATUS => Self::SystemStatus(serde_json::from_value(payload)?),
            Self::INCIDENT_CREATED => Self::IncidentCreated(serde_json::from_value(payload)?),
            Self::PLAN_GENERATED => Self::PlanGenerated(serde_json::from_value(payload)?),
            Self::TESTS_UPDATED => Self::TestsUpdated(serde_json::from_value(payload)?),
            Self::COPILOT_ANSWER => Self::CopilotAnswer(serde_json::from_value(payload)?),
            _ => Self::Unknown {
                kind: envelope.kind,
            },
        };
        Ok(message)
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::SystemStatus(_) => Self::SYSTEM_STATUS,
            Self::IncidentCreated(_) => Self::INCIDENT_CREATED,
            Self::PlanGenerated(_) => Self::PLAN_GENERATED,
            Self::TestsUpdated(_) => Self::TESTS_UPDATED,
            Self::CopilotAnswer(_) => Self::COPILOT_ANSWER,
            Self::Unknown { kind } => kind,
        }
    }
}
