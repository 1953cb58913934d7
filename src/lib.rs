//! Weather lookups exposed as tools to LLM agents.
//!
//! The same four tools (current weather, forecast, alerts and local time)
//! can be handed to an [`Agent`] directly, or served over stdio by an
//! [`McpServer`] and mounted on the client side through [`mcp::McpTools`].

mod agent;
pub mod config;
mod error;
mod llm;
pub mod mcp;
mod message;
mod server;
pub mod telemetry;
mod tool;
pub mod weather;

pub use agent::{
    format_transcript, weather_assistant, weather_time_agent, Agent, AgentDirective, WEATHER_ASSISTANT,
    WEATHER_TIME_AGENT,
};
pub use config::{AppConfig, Units};
pub use error::{Result, WeatherError};
pub use llm::{GeminiClient, LanguageModel, ModelCompletion, StubModel};
pub use message::{Message, Role, ToolCall, ToolOutput};
pub use server::McpServer;
pub use tool::{
    Content, ParamSpec, ParamType, RequestEnvelope, ResponseEnvelope, Tool, ToolArguments,
    ToolDescriptor, ToolRegistry, ToolResult,
};
pub use weather::{weather_toolkit, WeatherService};
