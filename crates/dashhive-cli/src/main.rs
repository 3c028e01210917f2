// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
// Allow clippy warnings for CLI application
#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::needless_pass_by_value, clippy::redundant_clone)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{agent, init, supervisor};

/// dashhive - supervised agent fleet with shared Q-learning
///
/// The supervisor spawns this same binary with the `agent` subcommand
/// once per roster entry; `init` scaffolds a fresh data directory with
/// seed tables and an empty knowledge base.
#[derive(Parser)]
#[command(name = "dashhive")]
#[command(author = "Andrew Yates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent fleet supervisor with shared Q-learning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet supervisor (spawns one agent process per roster entry)
    Supervisor(supervisor::SupervisorArgs),

    /// Run a single agent (normally spawned by the supervisor)
    Agent(agent::AgentArgs),

    /// Scaffold a data directory with seed tables and a knowledge base
    Init(init::InitArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dashhive=info,dashhive_cli=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                // Agent processes log on stderr; stdout is the control channel.
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Supervisor(args) => supervisor::run(args).await,
        Commands::Agent(args) => agent::run(args).await,
        Commands::Init(args) => init::run(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses_known_subcommands() {
        let cli = Cli::try_parse_from(["dashhive", "supervisor"]).expect("parse supervisor");
        assert!(matches!(cli.command, Commands::Supervisor(_)));

        let cli = Cli::try_parse_from([
            "dashhive", "agent", "--name", "Sniffer", "--role", "explorer",
        ])
        .expect("parse agent");
        assert!(matches!(cli.command, Commands::Agent(_)));

        let cli = Cli::try_parse_from(["dashhive", "init", "--data-dir", "/tmp/hive"])
            .expect("parse init");
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test]
    fn clap_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["dashhive", "teleport"]).is_err());
    }
}
