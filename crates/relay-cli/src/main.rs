//! relay: terminal sessions on relay hosts.
//!
//! Opens interactive shells on one or more hosts through a relay's WebSocket
//! terminal endpoint, one tab per session.

mod commands;
mod config;
mod terminal;

use clap::{Parser, Subcommand};
use tracing::{error, warn};

use crate::commands::connect::ConnectArgs;
use crate::config::{Config, Overrides};

/// relay: terminal session client
#[derive(Parser)]
#[command(name = "relay", version = "0.1.0", about = "Terminal sessions on relay hosts over WebSocket")]
struct Cli {
    /// Origin the terminal URL is derived from (e.g. https://relay.example.com)
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Bearer token sent when opening the channel
    #[arg(long, global = true)]
    token: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open interactive sessions, one tab per host
    Connect {
        /// Host ids to connect to
        #[arg(required = true)]
        hosts: Vec<String>,

        /// Display name for the tab(s)
        #[arg(long)]
        name: Option<String>,

        /// Command to run instead of the configured one
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Print the terminal URL for a host
    Url {
        /// Host id
        host: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with session output on stdout.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("relay=debug,relay_cli=debug,relay_client=debug,relay_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("relay=warn,relay_cli=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".relay").join("config.toml").to_string_lossy().to_string()
    });
    let cfg = Config::load(&config_path).unwrap_or_else(|e| {
        warn!("{e:#}; using defaults");
        Config::default()
    });

    let mut overrides = Overrides {
        origin: cli.origin.clone(),
        token: cli.token.clone(),
        command: None,
    };

    let result = match cli.command {
        Command::Connect { hosts, name, command } => {
            if !command.is_empty() {
                overrides.command = Some(command);
            }
            let args = ConnectArgs {
                hosts,
                name,
                connect: cfg.connect_config(&overrides),
                orchestrator: cfg.orchestrator_config(&overrides),
            };
            commands::connect::run(args).await
        }
        Command::Url { host } => commands::url::run(&cfg.origin(&overrides), &host),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("relay: {e:#}");
        std::process::exit(1);
    }
}
