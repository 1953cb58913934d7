//! Runs the `weather_time_agent` with the weather tools registered
//! in-process. Without `--query` it reads questions from stdin, one per line.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use weather_mcp::config::AppConfig;
use weather_mcp::telemetry::init_tracing;
use weather_mcp::{
    format_transcript, weather_time_agent, weather_toolkit, Agent, GeminiClient, WeatherService,
};

#[derive(Parser)]
#[command(name = "weather-agent", about = "Ask the weather agent about any city")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Single question; omit to read questions from stdin
    #[arg(short, long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_tracing(&config.logging)?;

    let service = Arc::new(WeatherService::new(config.weather.clone())?);
    let model = Arc::new(GeminiClient::from_config(&config.agent)?);
    let mut agent = weather_time_agent(model, weather_toolkit(service))
        .with_max_steps(config.agent.max_steps);

    if let Some(query) = args.query {
        ask(&mut agent, query).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        ask(&mut agent, query.to_string()).await;
    }
    Ok(())
}

async fn ask(agent: &mut Agent<GeminiClient>, query: String) {
    let seen = agent.transcript().len();
    let outcome = agent.respond(query).await;
    for line in format_transcript(&agent.transcript()[seen..]) {
        println!("{line}");
    }
    if let Err(err) = outcome {
        eprintln!("Agent error: {err}");
    }
}
