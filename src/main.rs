mod client;
mod commands;
mod config;
mod domain;
mod error;
mod logging;
mod render;
mod session;
#[cfg(test)]
mod testing;
mod transport;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::LogFormat;

#[derive(Parser)]
#[command(name = "fixloop", version, about = "Operator console for the FixLoop incident-response backend")]
struct Cli {
    /// Backend base URL (overrides config)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Path to config file (default: ~/.config/fixloop/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (overrides config)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Live dashboard: snapshot, push updates and operator commands on stdin
    Watch {
        /// Only render; do not read commands from stdin
        #[arg(long)]
        no_input: bool,
    },

    /// One-shot calls against the backend REST API
    Query {
        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::query::QueryCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format.into();
    }
    logging::init(&config);

    match cli.command {
        Commands::Watch { no_input } => commands::watch::run(config, !no_input),
        Commands::Query { format, command } => commands::query::run(&config, &format, &command),
    }
}
