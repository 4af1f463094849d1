mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use runrelay_assistant::{OpenAiAssistants, ScriptedGateway};
use runrelay_core::{AssistantGateway, RunStatus, ToolCall};
use runrelay_gateway::{start_server, GatewayState, SessionStore};
use runrelay_resolver::RunResolver;

use config::Config;

const OFFLINE_THREADS: usize = 1024;
const OFFLINE_CALL_LOG: usize = 4096;

#[derive(Parser)]
#[command(name = "runrelay")]
#[command(about = "runrelay: conversational gateway for assistant runs and their tool calls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Serve against an in-memory scripted assistant instead of the API
        #[arg(long)]
        offline: bool,
    },
    /// Show current gateway status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    runrelay_logging::init_logger(config.log_dir.as_deref(), &config.log_level);

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, offline } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                ..config
            };
            run_server(config, offline).await?;
        }
        Commands::Status => {
            println!("runrelay status: checking...");
            let client = reqwest::Client::new();
            match client
                .get(format!("http://localhost:{}/health", config.port))
                .send()
                .await
            {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("runrelay is not running on port {}", config.port);
                }
            }
        }
    }

    Ok(())
}

/// Demo assistant: asks for one order to be resolved, then replies.
fn offline_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .then_status(RunStatus::Queued)
        .then_status(RunStatus::InProgress)
        .then_action(vec![ToolCall::new(
            "call_demo",
            runrelay_tools::resolve_order::NAME,
            r#"{"name":"order-42"}"#,
        )])
        .then_status(RunStatus::InProgress)
        .then_status(RunStatus::Completed)
        .with_reply("Order order-42 has been resolved.")
        .with_retention(OFFLINE_THREADS, OFFLINE_CALL_LOG)
}

fn assistant_gateway(config: &Config, offline: bool) -> Result<Arc<dyn AssistantGateway>> {
    if offline {
        warn!("Running offline against the scripted assistant");
        return Ok(Arc::new(offline_gateway()));
    }

    let api_key = config
        .api_key
        .as_deref()
        .context("OPENAI_API_KEY is not set (use --offline to run without it)")?;
    let client = OpenAiAssistants::new(api_key).with_base_url(&config.base_url);
    info!(base_url = %client.base_url(), "Using Assistants API");
    Ok(Arc::new(client))
}

async fn run_server(config: Config, offline: bool) -> Result<()> {
    info!(
        port = config.port,
        bind = %config.bind_address,
        assistant_id = %config.assistant_id,
        offline,
        "Starting runrelay"
    );

    if config.assistant_id.is_empty() && !offline {
        warn!("OPENAI_ASSISTANT_ID is empty, runs will be rejected by the API");
    }

    let gateway = assistant_gateway(&config, offline)?;

    let registry = Arc::new(runrelay_tools::default_registry());
    info!(functions = registry.len(), "Registered functions");

    let resolver = Arc::new(
        RunResolver::new(Arc::clone(&gateway), registry).with_poll_interval(config.poll_interval),
    );

    let sessions = SessionStore::with_ttl(config.session_ttl);

    let state = GatewayState::new(resolver, gateway, sessions, config.assistant_id.as_str())
        .with_request_timeout(config.request_timeout);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address))?;

    start_server(addr, state).await
}
