//! Client and server wired together in-process through a duplex pipe, plus
//! both agent flavours driven by a scripted model.

use std::sync::Arc;

use serde_json::json;
use tokio::io::{duplex, split};
use weather_mcp::config::WeatherConfig;
use weather_mcp::mcp::{LineTransport, McpClient, McpTools, McpTransport};
use weather_mcp::weather::{ApiResponse, ScriptedBackend};
use weather_mcp::{
    weather_assistant, weather_time_agent, weather_toolkit, McpServer, Role, StubModel,
    ToolArguments, ToolRegistry, ToolResult, WeatherService,
};

fn sydney_weather() -> ApiResponse {
    ApiResponse::ok(json!({
        "weather": [{"description": "light rain"}],
        "main": {"temp": 18.4, "humidity": 77},
        "wind": {"speed": 5.1}
    }))
}

const SYDNEY_REPORT: &str =
    "The weather in Sydney is light rain with a temperature of 18.4°C. Humidity: 77%, Wind Speed: 5.1 m/s";

fn toolkit(responses: Vec<ApiResponse>) -> (ToolRegistry, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(responses));
    let service = WeatherService::with_backend(
        WeatherConfig::default().with_api_key("test-key"),
        backend.clone(),
    );
    (weather_toolkit(Arc::new(service)), backend)
}

/// Starts a server task and returns a client connected to it.
fn connect(registry: ToolRegistry) -> McpClient<impl McpTransport> {
    let (client_io, server_io) = duplex(64 * 1024);
    let (server_read, server_write) = split(server_io);
    let server = McpServer::new("weather-mcp-server", "0.1.0", registry);
    tokio::spawn(async move { server.serve(server_read, server_write).await });

    let (client_read, client_write) = split(client_io);
    McpClient::new(LineTransport::new(client_read, client_write))
}

#[tokio::test]
async fn client_sees_server_tools_and_results() {
    let (registry, backend) = toolkit(vec![sydney_weather()]);
    let mut client = connect(registry);
    assert!(!client.is_initialized());

    let info = client.initialize().await.unwrap().clone();
    assert_eq!(info.name, "weather-mcp-server");
    assert_eq!(client.protocol_version(), Some("2024-11-05"));
    assert!(client.is_initialized());
    client.ping().await.unwrap();

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 4);
    assert_eq!(tools[0].name, "get_weather");

    let mut arguments = ToolArguments::new();
    arguments.insert("city".into(), json!("Sydney"));
    let response = client.call_tool("get_weather", arguments).await.unwrap();
    assert!(!response.is_error);
    assert_eq!(response.joined_text(), SYDNEY_REPORT);

    let requests = backend.requests();
    let (endpoint, query) = &requests[0];
    assert_eq!(endpoint, "weather");
    assert!(query.contains(&("q".to_string(), "Sydney".to_string())));

    client.close().await.unwrap();
}

#[tokio::test]
async fn assistant_answers_through_mounted_remote_tools() {
    let (remote, _backend) = toolkit(vec![sydney_weather()]);
    let tools = McpTools::new(connect(remote));
    let mut registry = ToolRegistry::new();
    assert_eq!(tools.register_tools(&mut registry).await.unwrap(), 4);
    assert_eq!(
        tools.server_info().await.map(|info| info.name),
        Some("weather-mcp-server".to_string())
    );

    let model = StubModel::new(vec![
        r#"{"action":"call_tool","name":"get_weather","arguments":{"city":"Sydney"}}"#.into(),
        r#"{"action":"respond","content":"Light rain and 18.4°C in Sydney."}"#.into(),
    ]);
    let mut agent = weather_assistant(model, registry);
    let reply = agent
        .respond("What's the weather like in Sydney, Australia?")
        .await
        .unwrap();
    assert_eq!(reply, "Light rain and 18.4°C in Sydney.");

    let result = agent
        .transcript()
        .iter()
        .find(|message| message.role == Role::Tool)
        .and_then(|message| message.tool_result.clone())
        .unwrap();
    let result: ToolResult = serde_json::from_value(result.output).unwrap();
    assert_eq!(result, ToolResult::success(SYDNEY_REPORT));

    tools.close().await.unwrap();
}

#[tokio::test]
async fn prefixed_remote_tools_keep_remote_names() {
    let (remote, _backend) = toolkit(vec![]);
    let tools = McpTools::new(connect(remote)).with_prefix("owm");
    let mut registry = ToolRegistry::new();
    tools.register_tools(&mut registry).await.unwrap();

    assert_eq!(
        registry.names(),
        vec!["owm_get_weather", "owm_get_forecast", "owm_get_alerts", "owm_get_current_time"]
    );
}

#[tokio::test]
async fn time_agent_reports_provider_errors_to_the_model() {
    let (registry, _backend) = toolkit(vec![ApiResponse::status(404)]);
    let model = StubModel::new(vec![
        r#"{"action":"call_tool","name":"get_current_time","arguments":{"city":"Atlantis"}}"#
            .into(),
        r#"{"action":"respond","content":"I could not find Atlantis."}"#.into(),
    ]);
    let mut agent = weather_time_agent(model, registry);
    assert_eq!(agent.name(), "weather_time_agent");

    let reply = agent.respond("What time is it in Atlantis?").await.unwrap();
    assert_eq!(reply, "I could not find Atlantis.");

    let output = agent.transcript()[2]
        .tool_result
        .as_ref()
        .map(|result| result.output.clone())
        .unwrap();
    assert_eq!(
        output,
        json!({"status": "error", "error_message": "Failed to get timezone data for Atlantis. Error: 404"})
    );
}
