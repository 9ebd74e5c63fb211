//! `fixloop query` — one-shot calls against the backend REST API.

use std::fmt::Write;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;

use crate::client::{Backend, BackendClient};
use crate::config::Config;
use crate::domain::types::SimulateMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
pub enum QueryCommands {
    /// Current system health
    Status,
    /// Active incident, if any
    Incident,
    /// A validation run by id
    Run {
        run_id: String,
    },
    /// Inject or clear the demo fault
    Bug {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Open or close a simulated incident
    Simulate {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Start a validation run for the active incident
    Validate,
    /// Ask the copilot a question
    Ask {
        question: String,
        /// Scope the question to this incident (defaults to the active one)
        #[arg(long)]
        incident: Option<String>,
    },
}

pub fn run(config: &Config, format: &str, command: &QueryCommands) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(config, format, command))
}

async fn run_async(config: &Config, format: &str, command: &QueryCommands) -> Result<()> {
    let client = BackendClient::new(&config.backend_url, config.request_timeout())
        .context("building HTTP client")?;
    debug!(backend = %client.base_url(), ?command, "running query");

    match command {
        QueryCommands::Status => {
            let data = client.status().await?;
            print_output(format, &data)
        }
        QueryCommands::Incident => {
            let data = client.current_incident().await?;
            print_output(format, &data)
        }
        QueryCommands::Run { run_id } => {
            let data = client.test_run(run_id).await?;
            print_output(format, &data)
        }
        QueryCommands::Bug { state } => {
            let data = client.set_bug(*state == Switch::On).await?;
            print_output(format, &data)
        }
        QueryCommands::Simulate { state } => {
            let mode = match state {
                Switch::On => SimulateMode::IncidentOn,
                Switch::Off => SimulateMode::IncidentOff,
            };
            let data = client.simulate_incident(mode).await?;
            print_output(format, &data)
        }
        QueryCommands::Validate => {
            let incident = client
                .current_incident()
                .await?
                .context("no active incident to validate")?;
            let data = client.run_tests(&incident.incident_id).await?;
            print_output(format, &data)
        }
        QueryCommands::Ask { question, incident } => {
            let incident_id = match incident {
                Some(id) => Some(id.clone()),
                None => client.current_incident().await?.map(|i| i.incident_id),
            };
            let data = client.ask(incident_id.as_deref(), question).await?;
            print_output(format, &data)
        }
    }
}

fn print_output<T: serde::Serialize>(format: &str, data: &T) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{}", json);
        }
        _ => {
            let value = serde_json::to_value(data)?;
            print!("{}", format_table(&value));
        }
    }
    Ok(())
}

/// Indented key/value rendering of a JSON value.
pub fn format_table(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

fn write_value(out: &mut String, value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) => {
                        let _ = writeln!(out, "{}{}:", pad, key);
                        write_value(out, val, indent + 1);
                    }
                    Value::Array(arr) => {
                        if arr.is_empty() {
                            let _ = writeln!(out, "{}{}: []", pad, key);
                        } else if arr.iter().all(|v| !v.is_object() && !v.is_array()) {
                            let items: Vec<String> = arr.iter().map(format_scalar).collect();
                            let _ = writeln!(out, "{}{}: {}", pad, key, items.join(", "));
                        } else {
                            let _ = writeln!(out, "{}{}:", pad, key);
                            for (i, item) in arr.iter().enumerate() {
                                if item.is_object() {
                                    let _ = writeln!(out, "{}  [{}]:", pad, i);
                                    write_value(out, item, indent + 2);
                                } else {
                                    let _ = writeln!(out, "{}  - {}", pad, format_scalar(item));
                                }
                            }
                        }
                    }
                    _ => {
                        let _ = writeln!(out, "{}{}: {}", pad, key, format_scalar(val));
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                if item.is_object() {
                    let _ = writeln!(out, "{}[{}]:", pad, i);
                    write_value(out, item, indent + 1);
                } else {
                    let _ = writeln!(out, "{}- {}", pad, format_scalar(item));
                }
            }
        }
        Value::Null => {
            let _ = writeln!(out, "{}(none)", pad);
        }
        _ => {
            let _ = writeln!(out, "{}{}", pad, format_scalar(value));
        }
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
