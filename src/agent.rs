use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, WeatherError};
use crate::llm::LanguageModel;
use crate::message::{Message, Role, ToolCall};
use crate::tool::{ToolArguments, ToolRegistry, ToolResult};

/// Structured instructions the language model should emit.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
}

pub const WEATHER_TIME_AGENT: &str = "weather_time_agent";
pub const WEATHER_ASSISTANT: &str = "weather_assistant";

/// Agent answering from the weather tools registered in-process.
pub fn weather_time_agent<M: LanguageModel>(model: Arc<M>, tools: ToolRegistry) -> Agent<M> {
    Agent::new(WEATHER_TIME_AGENT, model)
        .with_description(
            "Agent to answer questions about the time, weather, forecasts, and alerts in any city \
             worldwide using OpenWeather API.",
        )
        .with_instruction(
            "I can answer your questions about the time, current weather, forecasts, and alerts in \
             any city worldwide. I use the OpenWeather API to provide accurate and up-to-date \
             information.",
        )
        .with_tools(tools)
}

/// Agent whose tools were fetched from a weather MCP server.
pub fn weather_assistant<M: LanguageModel>(model: Arc<M>, tools: ToolRegistry) -> Agent<M> {
    Agent::new(WEATHER_ASSISTANT, model)
        .with_description("Weather assistant backed by a weather MCP server.")
        .with_instruction(
            "Help users get weather information, forecasts, alerts, and time for any city worldwide.",
        )
        .with_tools(tools)
}

/// An agent that alternates between the model and registered tools.
pub struct Agent<M: LanguageModel> {
    name: String,
    description: String,
    instruction: String,
    session_id: Uuid,
    model: Arc<M>,
    tools: ToolRegistry,
    transcript: Vec<Message>,
    max_steps: usize,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(name: impl Into<String>, model: Arc<M>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: "You are a helpful agent.".to_string(),
            session_id: Uuid::new_v4(),
            model,
            tools: ToolRegistry::new(),
            transcript: Vec::new(),
            max_steps: 6,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Every message exchanged so far, without the system prompt.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Run a single exchange with the agent. Returns the final assistant reply.
    pub async fn respond(&mut self, user_input: impl Into<String>) -> Result<String> {
        self.transcript.push(Message::user(user_input));
        let descriptors = self.tools.list_tools();

        for step in 0..self.max_steps {
            let prompt = self.build_prompt();
            debug!(agent = %self.name, session = %self.session_id, step, "asking model");
            let completion = self.model.complete_chat(&prompt, &descriptors).await?;

            if completion.tool_calls.is_empty() {
                let reply = completion.content.unwrap_or_default();
                self.transcript.push(Message::assistant(reply.clone()));
                return Ok(reply);
            }

            for call in completion.tool_calls {
                let output = self.run_tool(&call).await;
                self.transcript.push(Message::tool_call(call.clone()));
                self.transcript.push(Message::tool_output(call.name, output));
            }
        }

        Err(WeatherError::LanguageModel(format!(
            "agent `{}` stopped after {} steps without a reply",
            self.name, self.max_steps
        )))
    }

    fn build_prompt(&self) -> Vec<Message> {
        let mut prompt = Vec::with_capacity(self.transcript.len() + 1);
        prompt.push(Message::system(self.instruction.clone()));
        prompt.extend(self.transcript.iter().cloned());
        prompt
    }

    /// Dispatch failures go back to the model as error results.
    async fn run_tool(&self, call: &ToolCall) -> Value {
        info!(agent = %self.name, tool = %call.name, "calling tool");
        let result = match tool_arguments(&call.arguments) {
            Ok(arguments) => self.tools.invoke(&call.name, arguments).await,
            Err(err) => Err(err),
        };
        let result = result.unwrap_or_else(|err| {
            warn!(tool = %call.name, error = %err, "tool call failed");
            ToolResult::error(err.to_string())
        });
        serde_json::to_value(&result).unwrap_or_else(|err| Value::String(err.to_string()))
    }
}

/// Human-readable lines for a transcript: agent replies, tool calls with
/// their arguments, and tool results. User turns are left out.
pub fn format_transcript(messages: &[Message]) -> Vec<String> {
    let mut lines = Vec::new();
    for message in messages {
        match (message.role, &message.tool_call, &message.tool_result) {
            (Role::Assistant, Some(call), _) => {
                lines.push(format!("Calling: {}", call.name));
                lines.push(format!("Arguments: {}", call.arguments));
            }
            (Role::Assistant, None, _) => lines.push(format!("Agent: {}", message.content)),
            (Role::Tool, _, Some(result)) => {
                let text = serde_json::from_value::<ToolResult>(result.output.clone())
                    .map(ToolResult::into_text)
                    .unwrap_or_else(|_| result.output.to_string());
                lines.push(format!("Result: {text}"));
            }
            _ => {}
        }
    }
    lines
}

fn tool_arguments(value: &Value) -> Result<ToolArguments> {
    match value {
        Value::Null => Ok(ToolArguments::new()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(WeatherError::Protocol(format!(
            "tool arguments must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubModel;

    #[test]
    fn directive_parses_both_actions() {
        let respond: AgentDirective =
            serde_json::from_str(r#"{"action":"respond","content":"hi"}"#).unwrap();
        assert_eq!(respond, AgentDirective::Respond { content: "hi".into() });

        let call: AgentDirective = serde_json::from_str(
            r#"{"action":"call_tool","name":"get_alerts","arguments":{"city":"Lima"}}"#,
        )
        .unwrap();
        assert!(matches!(call, AgentDirective::CallTool { name, .. } if name == "get_alerts"));
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_to_the_model() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"get_sunrise","arguments":{"city":"Lima"}}"#.into(),
            r#"{"action":"respond","content":"I cannot tell sunrise times."}"#.into(),
        ]);
        let mut agent = weather_assistant(model, ToolRegistry::new());

        let reply = agent.respond("When is sunrise in Lima?").await.unwrap();
        assert_eq!(reply, "I cannot tell sunrise times.");

        let transcript = agent.transcript();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2].role, Role::Tool);
        let output = &transcript[2].tool_result.as_ref().unwrap().output;
        assert_eq!(output["status"], "error");
        assert_eq!(output["error_message"], "tool `get_sunrise` not found");
    }

    #[tokio::test]
    async fn gives_up_after_max_steps() {
        let looping = r#"{"action":"call_tool","name":"noop","arguments":null}"#.to_string();
        let model = StubModel::new(vec![looping.clone(), looping]);
        let mut agent = Agent::new("looper", model).with_max_steps(2);

        let err = agent.respond("loop").await.unwrap_err();
        assert!(err.to_string().contains("stopped after 2 steps"));
    }

    #[test]
    fn transcript_lines_follow_the_exchange() {
        let messages = vec![
            Message::user("Weather in Oslo?"),
            Message::tool_call(ToolCall {
                id: None,
                name: "get_weather".into(),
                arguments: serde_json::json!({"city": "Oslo"}),
            }),
            Message::tool_output(
                "get_weather",
                serde_json::to_value(ToolResult::success("Cold.")).unwrap(),
            ),
            Message::assistant("It is cold in Oslo."),
        ];
        assert_eq!(
            format_transcript(&messages),
            vec![
                "Calling: get_weather",
                r#"Arguments: {"city":"Oslo"}"#,
                "Result: Cold.",
                "Agent: It is cold in Oslo.",
            ]
        );
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        assert!(tool_arguments(&Value::Null).unwrap().is_empty());
        assert!(tool_arguments(&serde_json::json!(["Lima"])).is_err());
    }
}
