//! `fixloop watch` — the live console.
//!
//! Hydrates from the backend, keeps the push channel open, redraws on every
//! state change and reads operator commands from stdin until `quit`, EOF or a
//! shutdown signal.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::client::Backend;
use crate::config::Config;
use crate::domain::store::Store;
use crate::domain::types::SimulateMode;
use crate::render;
use crate::session::Session;

const HELP: &str = "commands: bug on|off, incident on|off, validate, refresh-run, ask <question>, dismiss, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    BugOn,
    BugOff,
    IncidentOn,
    IncidentOff,
    Validate,
    RefreshRun,
    Ask(String),
    Dismiss,
    Quit,
}

impl Input {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        match (verb, rest) {
            ("bug", "on") => Some(Self::BugOn),
            ("bug", "off") => Some(Self::BugOff),
            ("incident", "on") => Some(Self::IncidentOn),
            ("incident", "off") => Some(Self::IncidentOff),
            ("validate", "") => Some(Self::Validate),
            ("refresh-run", "") => Some(Self::RefreshRun),
            ("ask", question) if !question.is_empty() => Some(Self::Ask(question.to_string())),
            ("dismiss", "") => Some(Self::Dismiss),
            ("quit" | "exit", "") => Some(Self::Quit),
            _ => None,
        }
    }
}

pub fn run(config: Config, read_input: bool) -> Result<()> {
    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(config, read_input))
}

async fn run_async(config: Config, read_input: bool) -> Result<()> {
    info!(backend = %config.backend_url, "console starting");
    let session = Session::from_config(&config)?;

    let mut updates = session.store().subscribe();
    let redraw = tokio::spawn(async move {
        loop {
            let frame = render::dashboard(&updates.borrow_and_update());
            println!("\x1B[2J\x1B[H{}{}", frame, HELP);
            let _ = std::io::stdout().flush();
            if updates.changed().await.is_err() {
                break;
            }
        }
    });

    session.start().await;

    if read_input {
        tokio::select! {
            _ = input_loop(session.store().clone()) => {},
            _ = shutdown_signal() => {},
        }
    } else {
        shutdown_signal().await;
    }

    session.shutdown();
    redraw.abort();
    info!("console stopped");
    Ok(())
}

async fn input_loop<B: Backend>(store: Arc<Store<B>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "reading stdin failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(input) = Input::parse(&line) else {
            warn!(input = %line, "unrecognised command");
            continue;
        };
        if input == Input::Quit {
            return;
        }
        // Commands run concurrently, as clicks would; each folds its own
        // result into the store when it resolves.
        let store = store.clone();
        tokio::spawn(async move { dispatch(&store, input).await });
    }
}

async fn dispatch<B: Backend>(store: &Store<B>, input: Input) {
    match input {
        Input::BugOn => store.introduce_bug().await,
        Input::BugOff => store.fix_bug().await,
        Input::IncidentOn => store.simulate_incident(SimulateMode::IncidentOn).await,
        Input::IncidentOff => store.simulate_incident(SimulateMode::IncidentOff).await,
        Input::Validate => store.start_validation().await,
        Input::RefreshRun => store.refresh_test_run().await,
        Input::Ask(question) => store.ask(&question).await,
        Input::Dismiss => store.clear_error(),
        Input::Quit => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, shutting down"); },
        _ = terminate => { info!("Received SIGTERM, shutting down"); },
    }
}
