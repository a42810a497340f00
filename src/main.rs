// aas-query - data analyst agent for Azure Analysis Services
// Main entry point
//
// Usage:
//   aas-query [chat]     interactive agent (spawns `aas-query serve` as its tool server)
//   aas-query serve      MCP tool server on stdin/stdout

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;

use aas_query::agent::AgentLoop;
use aas_query::bridge::QueryBridge;
use aas_query::cli::Repl;
use aas_query::config::{load_config, load_dotenv, Config};
use aas_query::errors::QueryError;
use aas_query::providers::OpenAIProvider;
use aas_query::tools::mcp::{McpClient, McpServer, McpServerConfig};

#[derive(Parser, Debug)]
#[command(name = "aas-query", version, about = "Ask questions about Azure Analysis Services data")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat with the data analyst agent (default)
    Chat {
        /// Tool server command line; defaults to this binary with `serve`
        #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
        server: Option<Vec<String>>,
    },
    /// Run the MCP tool server over stdio
    Serve,
}

fn main() -> Result<()> {
    // Runs before the runtime spawns any threads; it may set variables
    let dotenv = load_dotenv(Path::new(".env"));

    // stdout carries the JSON-RPC stream in `serve` mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("aas_query=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(0) => {}
        Ok(n) => tracing::debug!("Loaded {} variables from .env", n),
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    if let Err(e) = runtime.block_on(run(cli)) {
        if let Some(query_error) = e.downcast_ref::<QueryError>() {
            if query_error.is_fatal() {
                eprintln!("Error: {}", query_error);
                std::process::exit(1);
            }
        }
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    match cli.command.unwrap_or(Commands::Chat { server: None }) {
        Commands::Serve => run_server(config).await,
        Commands::Chat { server } => run_chat(config, server).await,
    }
}

async fn run_server(config: Config) -> Result<()> {
    config.validate_for_server()?;

    let bridge = QueryBridge::from_config(&config.backend)?;
    tracing::info!(url = %bridge.function_url(), "Starting MCP server on stdio");

    McpServer::new(bridge)
        .serve_stdio()
        .await
        .context("MCP server failed")?;

    tracing::info!("MCP server stopped");
    Ok(())
}

async fn run_chat(config: Config, server: Option<Vec<String>>) -> Result<()> {
    config.validate_for_agent()?;

    let server_config = match server {
        Some(mut parts) if !parts.is_empty() => {
            let command = parts.remove(0);
            McpServerConfig::new(command, parts)
        }
        _ => {
            // The child reads the same environment, so check its settings here
            config.validate_for_server()?;
            McpServerConfig::current_exe_serve()
                .context("Failed to locate the aas-query executable")?
        }
    };

    let provider = OpenAIProvider::from_config(&config.llm)?;
    let client = Arc::new(
        McpClient::spawn(&server_config)
            .await
            .context("Failed to start MCP tool server")?,
    );

    let mut agent = AgentLoop::new(Arc::new(provider), client.clone(), config.agent.clone())
        .await?
        .with_generation(config.llm.max_tokens, config.llm.temperature);

    let mut repl = Repl::new(agent.tool_definitions().to_vec())?;
    repl.print_banner();
    let outcome = agent.run(&mut repl).await;
    repl.print_goodbye();

    if let Err(e) = client.shutdown().await {
        tracing::warn!("Failed to stop MCP server: {}", e);
    }
    outcome
}
