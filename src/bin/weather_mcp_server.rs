//! MCP server exposing the weather tools over stdin/stdout.
//!
//! Stdout carries protocol messages only; logs go to stderr.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use weather_mcp::config::AppConfig;
use weather_mcp::telemetry::init_tracing;
use weather_mcp::{weather_toolkit, McpServer, Units, WeatherService};

#[derive(Parser)]
#[command(name = "weather-mcp-server", about = "Weather tools over MCP stdio")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Unit system for temperatures and wind speed (metric or imperial)
    #[arg(long)]
    units: Option<Units>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(units) = args.units {
        config.weather.units = units;
    }
    init_tracing(&config.logging)?;

    if config.weather.api_key().is_none() {
        warn!("OPENWEATHERMAP_API_KEY is not set, every tool call will report it");
    }

    let service = Arc::new(WeatherService::new(config.weather.clone())?);
    let server = McpServer::from_config(&config.server, weather_toolkit(service));
    server.serve_stdio().await?;
    Ok(())
}
