mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Client and daemon control for bridged", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon: connection loop, background monitor, socket bind
    Serve,

    /// Invoke a module function, going through the daemon if reachable or falling back to
    /// a one-shot in-process execution otherwise
    Call {
        /// Module name, e.g. "database"
        module: String,

        /// Function name, e.g. "execute_immediate"
        function: String,

        /// A `key=value` parameter; may be repeated. Values are parsed as JSON when
        /// possible, otherwise kept as strings.
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Check daemon health: a `system.health` call against a running daemon, or a local
    /// liveness check in fallback mode
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = std::env::var("BRIDGE_DEBUG").map(|v| v != "0" && !v.is_empty()).unwrap_or(false);
    tracing_subscriber::fmt()
        .with_max_level(if debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match cli.command {
        Commands::Serve => commands::serve::execute().await,
        Commands::Call {
            module,
            function,
            params,
        } => commands::call::execute(&module, &function, &params).await,
        Commands::Health => commands::health::execute().await,
    }
}
