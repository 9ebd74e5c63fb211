//! Terminal rendering of a store snapshot.

use std::fmt::Write;

use colored::{ColoredString, Colorize};

use crate::domain::store::AppState;
use crate::domain::types::{
    IncidentCard, PlanItemKind, Role, RunStatus, StatusKind, SystemStatus, TestRun, TestStatus,
};

/// Chat turns shown under the dashboard; older turns stay in the store.
const CHAT_TAIL: usize = 6;

pub fn dashboard(state: &AppState) -> String {
    let mut out = String::new();
    status_bar(&mut out, state);
    if let Some(error) = &state.error {
        let _ = writeln!(out, "{} {}  {}", "!".red().bold(), error.red(), "(dismiss)".dimmed());
    }
    let _ = writeln!(out);
    incident_section(&mut out, state);
    let _ = writeln!(out);
    run_section(&mut out, state.test_run.as_ref());
    let _ = writeln!(out);
    chat_section(&mut out, state);
    out
}

fn status_label(kind: StatusKind) -> ColoredString {
    match kind {
        StatusKind::Healthy => "HEALTHY".green().bold(),
        StatusKind::IncidentActive => "INCIDENT_ACTIVE".red().bold(),
        StatusKind::Validating => "VALIDATING".yellow().bold(),
        StatusKind::Recovered => "RECOVERED".cyan().bold(),
    }
}

fn status_bar(out: &mut String, state: &AppState) {
    let push = if state.ws_connected {
        "live".green()
    } else {
        "offline".red()
    };
    let busy = if state.loading.action {
        format!("  {}", "working…".yellow())
    } else {
        String::new()
    };

    match &state.system_status {
        Some(SystemStatus {
            status,
            error_rate_5m,
            p95_latency_ms_5m,
            ..
        }) => {
            let _ = writeln!(
                out,
                "{}  {}  err {:.2}%  p95 {:.0}ms  push: {}{}",
                "FixLoop".bold(),
                status_label(*status),
                error_rate_5m,
                p95_latency_ms_5m,
                push,
                busy
            );
        }
        None => {
            let _ = writeln!(out, "{}  {}  push: {}{}", "FixLoop".bold(), "—".dimmed(), push, busy);
        }
    }
}

fn kind_label(kind: PlanItemKind) -> ColoredString {
    match kind {
        PlanItemKind::Api => "API".magenta(),
        PlanItemKind::Ui => "UI".cyan(),
        PlanItemKind::Synthetic => "SYNTHETIC".yellow(),
    }
}

fn incident_section(out: &mut String, state: &AppState) {
    let _ = writeln!(out, "{}", "Incident".bold().underline());
    if state.loading.initial {
        let _ = writeln!(out, "  {}", "Loading…".dimmed());
        return;
    }
    let Some(incident) = &state.incident else {
        let _ = writeln!(out, "  No active incident");
        let _ = writeln!(out, "  {}", "System is operating normally".dimmed());
        return;
    };
    incident_card(out, incident);
}

fn incident_card(out: &mut String, incident: &IncidentCard) {
    let summary = &incident.summary;
    let _ = writeln!(out, "  {} {}", incident.title.bold(), format!("({})", incident.incident_id).dimmed());
    let _ = writeln!(out, "  detected {}  service {}", incident.detected_at, summary.service);
    let _ = writeln!(
        out,
        "  signal: err {:.2}%  p95 {:.0}ms",
        summary.signal.error_rate_5m, summary.signal.p95_latency_ms_5m
    );
    if let Some(top_error) = &summary.signal.top_error {
        let _ = writeln!(out, "  top error: {}", top_error.red());
    }
    for link in &summary.evidence_links {
        let _ = writeln!(out, "  ↗ {} {}", link.label, link.url.dimmed());
    }

    match incident.plan.as_ref().filter(|_| incident.plan_ready()) {
        Some(plan) => {
            let _ = writeln!(out, "  {} {}", "Recovery plan".bold(), plan.plan_id.dimmed());
            for item in plan.sorted_items() {
                let _ = writeln!(
                    out,
                    "    {}. [{}] {} {}",
                    item.priority,
                    kind_label(item.kind),
                    item.name,
                    format!("- {}", item.what_it_checks).dimmed()
                );
            }
        }
        _ => {
            let _ = writeln!(out, "  {}", "Generating recovery plan…".dimmed());
        }
    }
}

fn test_icon(status: TestStatus) -> ColoredString {
    match status {
        TestStatus::Pending => "·".dimmed(),
        TestStatus::Running => "…".yellow(),
        TestStatus::Pass => "✔".green(),
        TestStatus::Fail => "✘".red(),
    }
}

fn run_section(out: &mut String, run: Option<&TestRun>) {
    let _ = writeln!(out, "{}", "Validation".bold().underline());
    let Some(run) = run else {
        let _ = writeln!(out, "  {}", "No validation run yet".dimmed());
        return;
    };
    let status = match run.status {
        RunStatus::Queued => "QUEUED".dimmed(),
        RunStatus::Running => "RUNNING".yellow(),
        RunStatus::Completed => "COMPLETED".green(),
        RunStatus::Failed => "FAILED".red(),
    };
    let _ = writeln!(
        out,
        "  run {} {}  {}/{} passed",
        run.run_id,
        status,
        run.passed(),
        run.tests.len()
    );
    for test in &run.tests {
        let _ = write!(out, "    {} {}", test_icon(test.status), test.name);
        match &test.details {
            Some(details) => {
                let _ = writeln!(out, " {}", details.dimmed());
            }
            None => {
                let _ = writeln!(out);
            }
        }
    }
    if run.is_terminal() {
        let _ = writeln!(out, "  {}", "Run finished".dimmed());
    }
}

fn chat_section(out: &mut String, state: &AppState) {
    let _ = writeln!(out, "{}", "Copilot".bold().underline());
    if state.chat.is_empty() {
        let _ = writeln!(out, "  {}", "Ask a question with `ask <text>`".dimmed());
        return;
    }
    let skip = state.chat.len().saturating_sub(CHAT_TAIL);
    for message in state.chat.iter().skip(skip) {
        let who = match message.role {
            Role::User => "you".blue().bold(),
            Role::Assistant => "copilot".magenta().bold(),
        };
        let _ = writeln!(out, "  {}: {}", who, message.content);
        for citation in &message.citations {
            let _ = writeln!(out, "      [{}] {}", citation.label, citation.url.dimmed());
        }
    }
}
