use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WeatherError};
use crate::tool::{ParamType, Tool, ToolArguments, ToolDescriptor, ToolRegistry, ToolResult};

use super::WeatherService;

pub const DEFAULT_FORECAST_DAYS: u32 = 3;
pub const MAX_FORECAST_DAYS: u32 = 5;

/// The four weather tools, in the order they are advertised.
pub fn weather_toolkit(service: Arc<WeatherService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(GetWeatherTool::new(service.clone()));
    registry.register(GetForecastTool::new(service.clone()));
    registry.register(GetAlertsTool::new(service.clone()));
    registry.register(GetCurrentTimeTool::new(service));
    registry
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CityParams {
    city: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForecastParams {
    city: String,
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    DEFAULT_FORECAST_DAYS as i64
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: ToolArguments) -> Result<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| WeatherError::invalid_arguments(tool, err.to_string()))
}

fn city_descriptor(name: &str, description: &str, what: &str) -> ToolDescriptor {
    ToolDescriptor::new(name, description).required(
        "city",
        ParamType::String,
        format!("The city to get {what} for, e.g. 'London' or 'London,UK'"),
    )
}

struct GetWeatherTool {
    descriptor: ToolDescriptor,
    service: Arc<WeatherService>,
}

impl GetWeatherTool {
    fn new(service: Arc<WeatherService>) -> Self {
        Self {
            descriptor: city_descriptor(
                "get_weather",
                "Get current weather for a location anywhere in the world",
                "weather",
            ),
            service,
        }
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments) -> Result<ToolResult> {
        let params: CityParams = parse(self.name(), arguments)?;
        Ok(self.service.get_weather(&params.city).await)
    }
}

struct GetForecastTool {
    descriptor: ToolDescriptor,
    service: Arc<WeatherService>,
}

impl GetForecastTool {
    fn new(service: Arc<WeatherService>) -> Self {
        Self {
            descriptor: city_descriptor(
                "get_forecast",
                "Get weather forecast for a location",
                "the forecast",
            )
            .optional(
                "days",
                ParamType::Integer,
                format!("Number of days to forecast (1-{MAX_FORECAST_DAYS}, default {DEFAULT_FORECAST_DAYS})"),
            ),
            service,
        }
    }
}

#[async_trait]
impl Tool for GetForecastTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments) -> Result<ToolResult> {
        let params: ForecastParams = parse(self.name(), arguments)?;
        let days = u32::try_from(params.days)
            .ok()
            .filter(|days| (1..=MAX_FORECAST_DAYS).contains(days))
            .ok_or_else(|| {
                WeatherError::invalid_arguments(
                    self.name(),
                    format!("`days` must be between 1 and {MAX_FORECAST_DAYS}, got {}", params.days),
                )
            })?;
        Ok(self.service.get_forecast(&params.city, days).await)
    }
}

struct GetAlertsTool {
    descriptor: ToolDescriptor,
    service: Arc<WeatherService>,
}

impl GetAlertsTool {
    fn new(service: Arc<WeatherService>) -> Self {
        Self {
            descriptor: city_descriptor(
                "get_alerts",
                "Get weather alerts for a location",
                "alerts",
            ),
            service,
        }
    }
}

#[async_trait]
impl Tool for GetAlertsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments) -> Result<ToolResult> {
        let params: CityParams = parse(self.name(), arguments)?;
        Ok(self.service.get_alerts(&params.city).await)
    }
}

struct GetCurrentTimeTool {
    descriptor: ToolDescriptor,
    service: Arc<WeatherService>,
}

impl GetCurrentTimeTool {
    fn new(service: Arc<WeatherService>) -> Self {
        Self {
            descriptor: city_descriptor(
                "get_current_time",
                "Get current time for a location",
                "the time",
            ),
            service,
        }
    }
}

#[async_trait]
impl Tool for GetCurrentTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments) -> Result<ToolResult> {
        let params: CityParams = parse(self.name(), arguments)?;
        Ok(self.service.get_current_time(&params.city).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeatherConfig;
    use crate::tool::RequestEnvelope;
    use crate::weather::{ApiResponse, ScriptedBackend};
    use serde_json::json;

    fn toolkit(responses: Vec<ApiResponse>) -> (ToolRegistry, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new(responses));
        let service = WeatherService::with_backend(
            WeatherConfig::default().with_api_key("test-key"),
            backend.clone(),
        );
        (weather_toolkit(Arc::new(service)), backend)
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn advertises_four_tools_in_order() {
        let (registry, _) = toolkit(vec![]);
        assert_eq!(
            registry.names(),
            vec!["get_weather", "get_forecast", "get_alerts", "get_current_time"]
        );
        for descriptor in registry.list_tools() {
            assert!(registry.get(&descriptor.name).is_some());
            assert_eq!(descriptor.input_schema()["required"], json!(["city"]));
        }
    }

    #[tokio::test]
    async fn forecast_days_accepts_string_digits() {
        let (registry, backend) = toolkit(vec![
            ApiResponse::ok(json!({"coord": {"lat": 1.0, "lon": 2.0}, "timezone": 0})),
            ApiResponse::ok(json!({"list": []})),
        ]);

        let result = registry
            .invoke("get_forecast", args(json!({"city": "Quito", "days": "5"})))
            .await
            .unwrap();
        assert_eq!(result, ToolResult::success("Weather Forecast for Quito:"));
        assert!(backend.requests()[1]
            .1
            .contains(&("cnt".to_string(), "40".to_string())));
    }

    #[tokio::test]
    async fn forecast_days_out_of_range_never_reaches_the_provider() {
        let (registry, backend) = toolkit(vec![]);
        let response = registry
            .call_tool(RequestEnvelope::new(
                "get_forecast",
                args(json!({"city": "Quito", "days": 9})),
            ))
            .await;
        assert_eq!(
            response.joined_text(),
            "Failed to execute tool 'get_forecast': invalid arguments for `get_forecast`: `days` must be between 1 and 5, got 9"
        );
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn legacy_location_key_is_rejected() {
        let (registry, backend) = toolkit(vec![]);
        let response = registry
            .call_tool(RequestEnvelope::new(
                "get_alerts",
                args(json!({"location": "Quito"})),
            ))
            .await;
        assert!(response
            .joined_text()
            .contains("unexpected argument `location`"));
        assert!(backend.requests().is_empty());
    }
}
