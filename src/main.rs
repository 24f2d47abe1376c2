//! Things5 intent resolver - command line entry point
//!
//! Runs the resolution pipeline for a single tool call and prints the
//! outcome as JSON, or lists the caller's devices.

use things5_mcp_rust::{
    config::ServerConfig,
    logging::{init_logging, LogConfig},
    AuthContext, IntentEngine, ResolutionRequest, Things5HttpClient,
};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

/// Things5 intent resolver configuration
#[derive(Parser, Debug)]
#[command(name = "things5-intent")]
#[command(about = "Resolve Things5 tool calls from partial arguments and free text")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(long, global = true, env = "THINGS5_CONFIG")]
    config: Option<PathBuf>,

    /// Bearer token forwarded to the Things5 API
    #[arg(long, global = true, env = "THINGS5_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline for one tool call
    Resolve {
        /// Tool name, e.g. machine_command_execute
        #[arg(long)]
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Free-text request from the user
        #[arg(long)]
        hint: Option<String>,
    },
    /// Show the device inventory
    Devices {
        /// Only devices whose name or serial contains this term
        #[arg(long)]
        term: Option<String>,

        /// Maximum number of devices listed with --term
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Bypass the inventory cache
        #[arg(long)]
        refresh: bool,
    },
    /// Show the commands and metrics of one device
    Capabilities {
        /// Device id
        #[arg(long)]
        device: String,
    },
}

impl Cli {
    fn load_config(&self) -> things5_mcp_rust::Result<ServerConfig> {
        match &self.config {
            Some(path) => ServerConfig::from_file(path),
            None => ServerConfig::from_env(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let mut log_config = LogConfig::from(&config.logging);
    if cli.debug {
        log_config.level = Level::DEBUG;
    }
    init_logging(log_config)?;

    info!("Using Things5 API at {}", config.things5.base_url);
    let client = Arc::new(Things5HttpClient::new(config.things5.clone())?);
    let engine = IntentEngine::new(&config.intent, client)?;
    let auth = AuthContext::new(cli.token);

    match cli.command {
        Command::Resolve { tool, args, hint } => {
            let raw_arguments: serde_json::Value = serde_json::from_str(&args)?;
            let mut request = ResolutionRequest::new(tool, raw_arguments, auth);
            if let Some(hint) = hint {
                request = request.with_hint(hint);
            }
            let outcome = engine.prepare(request).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Devices {
            term,
            limit,
            refresh,
        } => {
            if refresh {
                engine.get_devices(&auth, true).await;
            }
            match term {
                Some(term) => {
                    let devices = engine.suggest_devices(&auth, Some(&term), limit).await;
                    println!("{}", serde_json::to_string_pretty(&devices)?);
                }
                None => println!("{}", engine.inventory_summary(&auth).await),
            }
        }
        Command::Capabilities { device } => {
            let capabilities = engine.device_capabilities(&device, &auth).await;
            println!("{}", serde_json::to_string_pretty(&capabilities)?);
        }
    }

    Ok(())
}
