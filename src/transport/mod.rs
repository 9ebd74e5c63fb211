//! Push-channel client with bounded exponential-backoff reconnection.
//!
//! One [`PushClient`] owns at most one live connection loop. The loop
//! connects, forwards every decoded frame to the registered message handler,
//! reports connectivity transitions to the registered connectivity handler,
//! and on loss waits `base_delay * 2^n` before the next attempt until
//! `max_retries` reconnects have been spent.

pub mod ws;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::domain::message::PushMessage;
use crate::error::{Error, Result};

pub use ws::{push_url, WsConnector};

/// Text frames from one open connection. The stream ending means the peer
/// closed; an `Err` item means the connection broke.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Opens one connection. Implemented over WebSockets in production and by
/// scripted fakes in tests.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> impl Future<Output = Result<FrameStream>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_retries: 5,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_retries: config.max_retries,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based), or `None` once
    /// the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Stopped,
}

type MessageHandler = Box<dyn Fn(PushMessage) + Send + Sync>;
type ConnectedHandler = Box<dyn Fn(bool) + Send + Sync>;

struct Handlers {
    on_message: MessageHandler,
    on_connected: ConnectedHandler,
}

struct Inner {
    handlers: Option<Handlers>,
    state: ConnectionState,
    /// Bumped by `stop()` and by every fresh `start()`; a loop whose
    /// generation is stale may no longer touch handlers or state.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

pub struct PushClient<C: Connector = WsConnector> {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<C>,
    inner: Arc<Mutex<Inner>>,
}

impl PushClient<WsConnector> {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self::with_connector(url, policy, WsConnector)
    }
}

impl<C: Connector> PushClient<C> {
    pub fn with_connector(url: impl Into<String>, policy: ReconnectPolicy, connector: C) -> Self {
        Self {
            url: url.into(),
            policy,
            connector: Arc::new(connector),
            inner: Arc::new(Mutex::new(Inner {
                handlers: None,
                state: ConnectionState::Idle,
                generation: 0,
                task: None,
            })),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    /// Register handlers and start connecting.
    ///
    /// Handlers from an earlier call are replaced. If a connection loop is
    /// already running it is kept as is; otherwise a new loop starts with a
    /// fresh retry budget. Handlers run with the client's lock held and must
    /// not call back into this client. Must be called within a tokio runtime.
    pub fn start<M, S>(&self, on_message: M, on_connected: S)
    where
        M: Fn(PushMessage) + Send + Sync + 'static,
        S: Fn(bool) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        inner.handlers = Some(Handlers {
            on_message: Box::new(on_message),
            on_connected: Box::new(on_connected),
        });

        if !matches!(inner.state, ConnectionState::Idle | ConnectionState::Stopped) {
            debug!(state = ?inner.state, "push client already running, handlers replaced");
            return;
        }

        inner.generation += 1;
        inner.state = ConnectionState::Connecting;
        let generation = inner.generation;
        info!(url = %self.url, "starting push client");
        inner.task = Some(tokio::spawn(run_loop(
            self.connector.clone(),
            self.url.clone(),
            self.policy,
            self.inner.clone(),
            generation,
        )));
    }

    /// Unregister handlers, close the channel and cancel any pending
    /// reconnect. No handler runs after this returns.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.handlers = None;
        inner.state = ConnectionState::Stopped;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        info!(url = %self.url, "push client stopped");
    }
}

impl<C: Connector> Drop for PushClient<C> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.inner).task.take() {
            task.abort();
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a state change and run `f` against the handlers, unless this loop
/// has been superseded. Returns `false` when the loop should exit.
fn with_current(
    inner: &Mutex<Inner>,
    generation: u64,
    state: Option<ConnectionState>,
    f: impl FnOnce(&Handlers),
) -> bool {
    let mut inner = lock(inner);
    if inner.generation != generation {
        return false;
    }
    if let Some(state) = state {
        inner.state = state;
    }
    if let Some(handlers) = inner.handlers.as_ref() {
        f(handlers);
    }
    true
}

async fn run_loop<C: Connector>(
    connector: Arc<C>,
    url: String,
    policy: ReconnectPolicy,
    inner: Arc<Mutex<Inner>>,
    generation: u64,
) {
    let mut retries: u32 = 0;

    loop {
        if !with_current(&inner, generation, Some(ConnectionState::Connecting), |_| {}) {
            return;
        }

        match connector.connect(&url).await {
            Ok(mut frames) => {
                retries = 0;
                info!(url = %url, "push channel open");
                if !with_current(&inner, generation, Some(ConnectionState::Open), |h| {
                    (h.on_connected)(true)
                }) {
                    return;
                }

                while let Some(frame) = frames.next().await {
                    let text = match frame {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "push channel errored");
                            break;
                        }
                    };
                    match PushMessage::parse(&text) {
                        Ok(message) => {
                            debug!(kind = message.kind(), "push message received");
                            if !with_current(&inner, generation, None, |h| (h.on_message)(message)) {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, frame = %text, "dropping malformed push frame");
                        }
                    }
                }
                info!(url = %url, "push channel closed");
            }
            Err(e) => {
                warn!(error = %e, url = %url, "push channel connect failed");
            }
        }

        if !with_current(&inner, generation, Some(ConnectionState::Closed), |h| {
            (h.on_connected)(false)
        }) {
            return;
        }

        let Some(delay) = policy.delay_for(retries) else {
            let err = Error::ReconnectExhausted { attempts: retries };
            warn!(error = %err, url = %url, "push channel giving up");
            with_current(&inner, generation, Some(ConnectionState::Stopped), |_| {});
            return;
        };
        retries += 1;
        info!(
            attempt = retries,
            delay_ms = delay.as_millis() as u64,
            "scheduling push channel reconnect"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{frame, open_stream, Script, ScriptedConnector};
    use tokio::sync::mpsc;

    fn status_frame(status: &str) -> String {
        frame(
            PushMessage::SYSTEM_STATUS,
            serde_json::json!({
                "status": status,
                "error_rate_5m": 0.2,
                "p95_latency_ms_5m": 120.0,
                "active_incident_id": null,
                "updated_at": "2025-01-01T00:00:00Z"
            }),
        )
    }

    type Events = (
        mpsc::UnboundedReceiver<PushMessage>,
        mpsc::UnboundedReceiver<bool>,
    );

    fn start_recording<C: Connector>(client: &PushClient<C>) -> Events {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        client.start(
            move |msg| {
                let _ = msg_tx.send(msg);
            },
            move |connected| {
                let _ = conn_tx.send(connected);
            },
        );
        (msg_rx, conn_rx)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn delay_doubles_until_budget_spent() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<Option<u64>> = (0..7)
            .map(|n| policy.delay_for(n).map(|d| d.as_millis() as u64))
            .collect();
        assert_eq!(
            delays,
            vec![
                Some(1000),
                Some(2000),
                Some(4000),
                Some(8000),
                Some(16000),
                None,
                None
            ]
        );
    }

    #[test]
    fn zero_retries_never_reconnects() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_retries: 0,
        };
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn policy_from_config() {
        let policy = ReconnectPolicy::from(&ReconnectConfig {
            base_delay_ms: 250,
            max_retries: 3,
        });
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_back_off_exponentially_then_stop() {
        let (connector, mut attempts) = ScriptedConnector::new(vec![]);
        let client =
            PushClient::with_connector("ws://test/ws", ReconnectPolicy::default(), connector);
        let (_msgs, mut connected) = start_recording(&client);

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(attempts.recv().await.unwrap());
        }
        let gaps: Vec<u64> = seen
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000]);

        let extra = tokio::time::timeout(Duration::from_secs(3600), attempts.recv()).await;
        assert!(extra.is_err(), "no attempt after the budget is spent");
        assert_eq!(client.state(), ConnectionState::Stopped);

        for _ in 0..6 {
            assert_eq!(connected.try_recv(), Ok(false));
        }
        assert!(connected.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_backoff() {
        let (open, frames) = open_stream();
        let (connector, mut attempts) =
            ScriptedConnector::new(vec![Script::Fail, Script::Fail, open]);
        let client =
            PushClient::with_connector("ws://test/ws", ReconnectPolicy::default(), connector);
        let (_msgs, mut connected) = start_recording(&client);

        let a0 = attempts.recv().await.unwrap();
        let a1 = attempts.recv().await.unwrap();
        let a2 = attempts.recv().await.unwrap();
        assert_eq!((a1 - a0).as_millis(), 1000);
        assert_eq!((a2 - a1).as_millis(), 2000);

        settle().await;
        assert_eq!(client.state(), ConnectionState::Open);

        // Peer closes; the next delay starts from the base again.
        drop(frames);
        let a3 = attempts.recv().await.unwrap();
        assert_eq!((a3 - a2).as_millis(), 1000);

        let transitions: Vec<bool> = (0..4).map(|_| connected.try_recv().unwrap()).collect();
        assert_eq!(transitions, vec![false, false, true, false]);
    }

    #[tokio::test]
    async fn delivers_messages_and_skips_malformed_frames() {
        let (open, frames) = open_stream();
        let (connector, _attempts) = ScriptedConnector::new(vec![open]);
        let client =
            PushClient::with_connector("ws://test/ws", ReconnectPolicy::default(), connector);
        let (mut msgs, mut connected) = start_recording(&client);

        assert_eq!(connected.recv().await, Some(true));
        frames.send(Ok("{definitely not json".into())).unwrap();
        frames.send(Ok(status_frame("HEALTHY"))).unwrap();

        let msg = msgs.recv().await.unwrap();
        assert_eq!(msg.kind(), PushMessage::SYSTEM_STATUS);
        settle().await;
        assert!(msgs.try_recv().is_err());
        assert!(connected.try_recv().is_err(), "parse failure leaves connectivity alone");
        assert_eq!(client.state(), ConnectionState::Open);
        client.stop();
    }

    #[tokio::test]
    async fn stream_error_counts_as_close() {
        let (open, frames) = open_stream();
        let (connector, _attempts) = ScriptedConnector::new(vec![open]);
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(5),
            max_retries: 0,
        };
        let client = PushClient::with_connector("ws://test/ws", policy, connector);
        let (_msgs, mut connected) = start_recording(&client);

        assert_eq!(connected.recv().await, Some(true));
        frames.send(Err(Error::Transport("reset by peer".into()))).unwrap();
        assert_eq!(connected.recv().await, Some(false));
        settle().await;
        assert_eq!(client.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn stop_is_terminal() {
        let (open, frames) = open_stream();
        let (connector, mut attempts) = ScriptedConnector::new(vec![open]);
        let client =
            PushClient::with_connector("ws://test/ws", ReconnectPolicy::default(), connector);
        let (mut msgs, mut connected) = start_recording(&client);

        assert_eq!(connected.recv().await, Some(true));
        frames.send(Ok(status_frame("HEALTHY"))).unwrap();
        assert!(msgs.recv().await.is_some());

        client.stop();
        assert_eq!(client.state(), ConnectionState::Stopped);

        let _ = frames.send(Ok(status_frame("RECOVERED")));
        drop(frames);
        settle().await;

        // Handlers were dropped with the registration, so the channels close
        // without ever seeing another event.
        assert_eq!(msgs.recv().await, None);
        assert_eq!(connected.recv().await, None);
        attempts.recv().await.unwrap();
        assert!(attempts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_reconnect() {
        let (connector, mut attempts) = ScriptedConnector::new(vec![]);
        let client =
            PushClient::with_connector("ws://test/ws", ReconnectPolicy::default(), connector);
        let (_msgs, mut connected) = start_recording(&client);

        attempts.recv().await.unwrap();
        assert_eq!(connected.recv().await, Some(false));
        client.stop();

        let next = tokio::time::timeout(Duration::from_secs(60), attempts.recv()).await;
        assert!(next.is_err());
        assert_eq!(connected.recv().await, None);
    }

    #[tokio::test]
    async fn start_while_running_only_swaps_handlers() {
        let (open, frames) = open_stream();
        let (connector, mut attempts) = ScriptedConnector::new(vec![open]);
        let client =
            PushClient::with_connector("ws://test/ws", ReconnectPolicy::default(), connector);
        let (mut first_msgs, mut first_conn) = start_recording(&client);
        assert_eq!(first_conn.recv().await, Some(true));

        let (mut second_msgs, _second_conn) = start_recording(&client);
        frames.send(Ok(status_frame("HEALTHY"))).unwrap();

        assert!(second_msgs.recv().await.is_some());
        assert_eq!(first_msgs.recv().await, None);
        attempts.recv().await.unwrap();
        settle().await;
        assert!(attempts.try_recv().is_err(), "no second connection");
        client.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_exhaustion_resets_budget() {
        let (connector, mut attempts) = ScriptedConnector::new(vec![]);
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(100),
            max_retries: 1,
        };
        let client = PushClient::with_connector("ws://test/ws", policy, connector);
        let _events = start_recording(&client);

        attempts.recv().await.unwrap();
        attempts.recv().await.unwrap();
        let extra = tokio::time::timeout(Duration::from_secs(10), attempts.recv()).await;
        assert!(extra.is_err());
        assert_eq!(client.state(), ConnectionState::Stopped);

        let _events = start_recording(&client);
        let b0 = attempts.recv().await.unwrap();
        let b1 = attempts.recv().await.unwrap();
        assert_eq!((b1 - b0).as_millis(), 100);
    }
}
