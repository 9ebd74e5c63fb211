//! Store — the single owner of console state.
//!
//! Two funnels write into it: command results from the [`Backend`] and push
//! messages from the channel. Both follow the same rules:
//!
//! - status, incident and test run are replaced wholesale on arrival
//! - chat messages are appended
//! - a plan arriving on its own is merged into the held incident
//!
//! There are no sequence numbers, so whichever write lands last wins. A
//! command response that resolves after a fresher push overwrites it.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::Backend;
use crate::error::Error;

use super::message::PushMessage;
use super::types::{ChatMessage, IncidentCard, SimulateMode, SystemStatus, TestRun};

/// Assistant reply appended when a question could not be answered.
pub const ASK_FALLBACK: &str = "Sorry, I couldn't get an answer right now. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loading {
    pub initial: bool,
    pub action: bool,
}

impl Default for Loading {
    fn default() -> Self {
        Self {
            initial: true,
            action: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub system_status: Option<SystemStatus>,
    pub incident: Option<IncidentCard>,
    pub test_run: Option<TestRun>,
    pub ws_connected: bool,
    pub loading: Loading,
    /// Dismissible banner text. Set by failed commands, never by chat.
    pub error: Option<String>,
    /// Append-only and unbounded; ordered by append time.
    pub chat: Vec<ChatMessage>,
}

pub struct Store<B: Backend> {
    backend: B,
    state: watch::Sender<AppState>,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self { backend, state }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Change notifications for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    fn read<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        f(&self.state.borrow())
    }

    fn incident_id(&self) -> Option<String> {
        self.read(|s| s.incident.as_ref().map(|i| i.incident_id.clone()))
    }

    fn fail(&self, err: &Error) {
        debug!(retryable = err.is_retryable(), "command failed, raising banner");
        let message = err.to_string();
        self.state.send_modify(|s| {
            s.loading.action = false;
            s.error = Some(message);
        });
    }

    fn begin_action(&self) {
        self.state.send_modify(|s| {
            s.loading.action = true;
            s.error = None;
        });
    }

    // ── Commands ───────────────────────────────────────────

    /// Pull the initial snapshot: status and current incident, concurrently.
    pub async fn hydrate(&self) {
        self.state.send_modify(|s| {
            s.loading = Loading {
                initial: true,
                action: false,
            };
            s.error = None;
        });

        match tokio::try_join!(self.backend.status(), self.backend.current_incident()) {
            Ok((status, incident)) => {
                info!(
                    status = ?status.status,
                    incident = incident.as_ref().map(|i| i.incident_id.as_str()),
                    "hydrated from backend"
                );
                self.state.send_modify(|s| {
                    s.system_status = Some(status);
                    s.incident = incident;
                    s.loading = Loading {
                        initial: false,
                        action: false,
                    };
                });
            }
            Err(e) => {
                warn!(error = %e, "hydration failed");
                let message = e.to_string();
                self.state.send_modify(|s| {
                    s.loading = Loading {
                        initial: false,
                        action: false,
                    };
                    s.error = Some(message);
                });
            }
        }
    }

    pub async fn introduce_bug(&self) {
        self.toggle_bug(true).await;
    }

    pub async fn fix_bug(&self) {
        self.toggle_bug(false).await;
    }

    async fn toggle_bug(&self, enabled: bool) {
        self.begin_action();
        match self.backend.set_bug(enabled).await {
            Ok(status) => {
                info!(enabled, status = ?status.status, "bug flag updated");
                self.state.send_modify(|s| {
                    s.system_status = Some(status);
                    s.loading.action = false;
                });
            }
            Err(e) => {
                warn!(enabled, error = %e, "bug toggle failed");
                self.fail(&e);
            }
        }
    }

    /// Ask the backend to open or close a simulated incident.
    pub async fn simulate_incident(&self, mode: SimulateMode) {
        self.begin_action();
        match self.backend.simulate_incident(mode).await {
            Ok(incident) => {
                info!(?mode, present = incident.is_some(), "incident simulation applied");
                self.state.send_modify(|s| {
                    s.incident = incident;
                    s.loading.action = false;
                });
            }
            Err(e) => {
                warn!(?mode, error = %e, "incident simulation failed");
                self.fail(&e);
            }
        }
    }

    /// Start a validation run for the held incident. Does nothing without one.
    pub async fn start_validation(&self) {
        let Some(incident_id) = self.incident_id() else {
            debug!("no active incident, validation not started");
            return;
        };

        self.begin_action();
        match self.backend.run_tests(&incident_id).await {
            Ok(run) => {
                info!(run_id = %run.run_id, incident_id = %incident_id, "validation run started");
                self.state.send_modify(|s| {
                    s.test_run = Some(run);
                    s.loading.action = false;
                });
            }
            Err(e) => {
                warn!(incident_id = %incident_id, error = %e, "validation start failed");
                self.fail(&e);
            }
        }
    }

    /// Re-fetch the held test run by id. Does nothing without one.
    pub async fn refresh_test_run(&self) {
        let Some(run_id) = self.read(|s| s.test_run.as_ref().map(|r| r.run_id.clone())) else {
            debug!("no test run to refresh");
            return;
        };

        match self.backend.test_run(&run_id).await {
            Ok(run) => self.state.send_modify(|s| s.test_run = Some(run)),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "test run refresh failed");
                let message = e.to_string();
                self.state.send_modify(|s| s.error = Some(message));
            }
        }
    }

    /// Append the question, then the answer or a fixed fallback. Failures
    /// stay in the chat and never touch the error banner.
    pub async fn ask(&self, question: &str) {
        let incident_id = self.incident_id();
        self.append_chat(ChatMessage::user(question));

        let reply = match self.backend.ask(incident_id.as_deref(), question).await {
            Ok(answer) => ChatMessage::from(answer),
            Err(e) => {
                warn!(error = %e, "copilot request failed");
                ChatMessage::assistant(ASK_FALLBACK)
            }
        };
        self.append_chat(reply);
    }

    fn append_chat(&self, message: ChatMessage) {
        self.state.send_modify(|s| s.chat.push(message));
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.ws_connected != connected;
            s.ws_connected = connected;
            changed
        });
    }

    /// Fold one push message into state.
    pub fn apply_push_message(&self, message: PushMessage) {
        match message {
            PushMessage::SystemStatus(status) => {
                self.state.send_modify(|s| s.system_status = Some(status));
            }
            PushMessage::IncidentCreated(incident) => {
                self.state.send_modify(|s| s.incident = Some(incident));
            }
            PushMessage::PlanGenerated(update) => {
                self.state.send_if_modified(|s| match s.incident.as_mut() {
                    Some(incident) => {
                        incident.plan = Some(update.plan);
                        true
                    }
                    None => {
                        debug!(
                            incident_id = update.incident_id.as_deref(),
                            "plan arrived with no incident held, dropped"
                        );
                        false
                    }
                });
            }
            PushMessage::TestsUpdated(run) => {
                self.state.send_modify(|s| s.test_run = Some(run));
            }
            PushMessage::CopilotAnswer(answer) => self.append_chat(answer.into()),
            PushMessage::Unknown { kind } => {
                debug!(kind = %kind, "ignoring unknown push message");
            }
        }
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }
}
