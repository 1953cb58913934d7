//! Launches the weather MCP server, mounts its tools and asks the
//! `weather_assistant` agent a question (or calls one tool directly).

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::info;
use weather_mcp::config::AppConfig;
use weather_mcp::mcp::{McpClient, McpTools, StdioTransport};
use weather_mcp::telemetry::init_tracing;
use weather_mcp::{
    format_transcript, weather_assistant, GeminiClient, RequestEnvelope, ToolArguments,
    ToolRegistry,
};

const DEFAULT_QUERY: &str = "What's the weather like in Sydney, Australia?";

#[derive(Parser)]
#[command(name = "weather-mcp-client", about = "Ask the weather MCP server through an agent")]
struct Args {
    /// Configuration file path, also handed to the server
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server executable (defaults to weather-mcp-server next to this binary)
    #[arg(long)]
    server: Option<PathBuf>,

    /// Extra argument for the server, may be repeated
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Question for the agent
    #[arg(short, long, default_value = DEFAULT_QUERY)]
    query: String,

    /// Call this tool directly instead of running the agent
    #[arg(long, requires = "city")]
    call: Option<String>,

    #[arg(long)]
    city: Option<String>,

    /// Forecast length for `--call get_forecast`
    #[arg(long)]
    days: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_tracing(&config.logging)?;

    let program = match &args.server {
        Some(path) => path.clone(),
        None => std::env::current_exe()?.with_file_name(format!(
            "weather-mcp-server{}",
            std::env::consts::EXE_SUFFIX
        )),
    };
    let mut server_args = Vec::new();
    if let Some(path) = &args.config {
        server_args.push("--config".to_string());
        server_args.push(path.display().to_string());
    }
    server_args.extend(args.server_args.iter().cloned());

    info!(server = %program.display(), "starting MCP server");
    let mut client = McpClient::new(StdioTransport::spawn(&program, &server_args)?);
    let server = client.initialize().await?;
    println!(
        "Connected to {} {}",
        server.name,
        server.version.as_deref().unwrap_or_default()
    );

    let tools = McpTools::new(client);
    let outcome = run(&args, &config, &tools).await;

    println!("Closing MCP server connection...");
    tools.close().await?;
    println!("Cleanup complete.");
    outcome
}

async fn run(
    args: &Args,
    config: &AppConfig,
    tools: &McpTools<StdioTransport>,
) -> Result<(), Box<dyn Error>> {
    let mut registry = ToolRegistry::new();
    let count = tools.register_tools(&mut registry).await?;
    println!("Found {count} tools: {}", registry.names().join(", "));

    if let Some(tool) = &args.call {
        let mut arguments = ToolArguments::new();
        if let Some(city) = &args.city {
            arguments.insert("city".into(), Value::from(city.as_str()));
        }
        if let Some(days) = args.days {
            arguments.insert("days".into(), Value::from(days));
        }
        let response = registry
            .call_tool(RequestEnvelope::new(tool.as_str(), arguments))
            .await;
        println!("\nResult: {}", response.joined_text());
        return Ok(());
    }

    let model = Arc::new(GeminiClient::from_config(&config.agent)?);
    let mut agent = weather_assistant(model, registry).with_max_steps(config.agent.max_steps);

    println!("\nUser: {}", args.query);
    let reply = agent.respond(args.query.as_str()).await;
    for line in format_transcript(agent.transcript()) {
        println!("\n{line}");
    }
    reply?;
    Ok(())
}
