//! Weather lookups against the OpenWeatherMap API.
//!
//! [`WeatherService`] implements the four lookups; each one returns a
//! [`ToolResult`] and never fails: a missing key, a non-200 status, a broken
//! connection or an unexpected payload all become `ToolResult::Error`.
//! [`weather_toolkit`] wraps the service as registry tools.

mod backend;
mod format;
mod models;
mod tools;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::WeatherConfig;
use crate::error::Result;
use crate::tool::ToolResult;

pub use backend::{ApiResponse, HttpBackend, RecordedRequest, ScriptedBackend, WeatherBackend};
pub use format::{capitalize, group_forecast, ForecastDay};
pub use models::{Alert, CurrentWeather, Forecast, ForecastEntry, Location, OneCallAlerts};
pub use tools::{weather_toolkit, DEFAULT_FORECAST_DAYS, MAX_FORECAST_DAYS};

pub const MISSING_API_KEY: &str =
    "OpenWeather API key not configured. Please set OPENWEATHERMAP_API_KEY in .env file.";

/// Forecast slots the provider returns per day (3-hour steps).
const SLOTS_PER_DAY: u32 = 8;

pub struct WeatherService {
    config: WeatherConfig,
    backend: Arc<dyn WeatherBackend>,
}

impl WeatherService {
    /// Service talking to the provider over HTTP.
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let backend = HttpBackend::new(&config)?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    pub fn with_backend(config: WeatherConfig, backend: Arc<dyn WeatherBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    pub async fn get_weather(&self, city: &str) -> ToolResult {
        let Some(key) = self.config.api_key() else {
            return ToolResult::error(MISSING_API_KEY);
        };
        info!(city, "looking up current weather");
        self.current_weather(city, key)
            .await
            .unwrap_or_else(|err| ToolResult::error(format!("Error retrieving weather data: {err}")))
    }

    pub async fn get_forecast(&self, city: &str, days: u32) -> ToolResult {
        let Some(key) = self.config.api_key() else {
            return ToolResult::error(MISSING_API_KEY);
        };
        info!(city, days, "looking up forecast");
        self.forecast(city, days, key)
            .await
            .unwrap_or_else(|err| ToolResult::error(format!("Error retrieving forecast data: {err}")))
    }

    pub async fn get_alerts(&self, city: &str) -> ToolResult {
        let Some(key) = self.config.api_key() else {
            return ToolResult::error(MISSING_API_KEY);
        };
        info!(city, "looking up weather alerts");
        self.alerts(city, key)
            .await
            .unwrap_or_else(|err| ToolResult::error(format!("Error retrieving alerts data: {err}")))
    }

    pub async fn get_current_time(&self, city: &str) -> ToolResult {
        self.current_time_at(city, Utc::now()).await
    }

    /// [`get_current_time`](Self::get_current_time) with an explicit clock.
    pub async fn current_time_at(&self, city: &str, now: DateTime<Utc>) -> ToolResult {
        let Some(key) = self.config.api_key() else {
            return ToolResult::error(MISSING_API_KEY);
        };
        info!(city, "looking up local time");
        self.local_time(city, key, now)
            .await
            .unwrap_or_else(|err| ToolResult::error(format!("Error retrieving time data: {err}")))
    }

    async fn current_weather(&self, city: &str, key: &str) -> Result<ToolResult> {
        let response = self
            .backend
            .get(
                "weather",
                &[
                    ("q", city.to_string()),
                    ("appid", key.to_string()),
                    ("units", self.config.units.as_query().to_string()),
                ],
            )
            .await?;
        if !response.is_ok() {
            return Ok(ToolResult::error(format!(
                "Failed to get weather data for {city}. Error: {}",
                response.status
            )));
        }

        let data: CurrentWeather = response.json()?;
        Ok(ToolResult::success(format::current_report(
            city,
            &data,
            self.config.units,
        )))
    }

    async fn forecast(&self, city: &str, days: u32, key: &str) -> Result<ToolResult> {
        let located = self.locate(city, key).await?;
        if !located.is_ok() {
            return Ok(ToolResult::error(format!(
                "Failed to get location data for {city}. Error: {}",
                located.status
            )));
        }
        let location: Location = located.json()?;

        let response = self
            .backend
            .get(
                "forecast",
                &[
                    ("lat", location.coord.lat.to_string()),
                    ("lon", location.coord.lon.to_string()),
                    ("appid", key.to_string()),
                    ("units", self.config.units.as_query().to_string()),
                    ("cnt", (days * SLOTS_PER_DAY).to_string()),
                ],
            )
            .await?;
        if !response.is_ok() {
            return Ok(ToolResult::error(format!(
                "Failed to get forecast data for {city}. Error: {}",
                response.status
            )));
        }

        let forecast: Forecast = response.json()?;
        let offset = format::offset_from_seconds(location.timezone);
        let grouped = format::group_forecast(&forecast.list, offset, self.config.units);
        Ok(ToolResult::success(format::forecast_report(city, &grouped)))
    }

    async fn alerts(&self, city: &str, key: &str) -> Result<ToolResult> {
        let located = self.locate(city, key).await?;
        if !located.is_ok() {
            return Ok(ToolResult::error(format!(
                "Failed to get location data for {city}. Error: {}",
                located.status
            )));
        }
        let location: Location = located.json()?;

        let response = self
            .backend
            .get(
                "onecall",
                &[
                    ("lat", location.coord.lat.to_string()),
                    ("lon", location.coord.lon.to_string()),
                    ("appid", key.to_string()),
                    ("exclude", "current,minutely,hourly,daily".to_string()),
                ],
            )
            .await?;
        if !response.is_ok() {
            return Ok(ToolResult::error(format!(
                "Failed to get alerts data for {city}. Error: {}",
                response.status
            )));
        }

        let data: OneCallAlerts = response.json()?;
        let alerts = data.alerts.unwrap_or_default();
        let offset = format::offset_from_seconds(location.timezone);
        Ok(ToolResult::success(format::alerts_report(city, &alerts, offset)))
    }

    async fn local_time(&self, city: &str, key: &str, now: DateTime<Utc>) -> Result<ToolResult> {
        let response = self.locate(city, key).await?;
        if !response.is_ok() {
            return Ok(ToolResult::error(format!(
                "Failed to get timezone data for {city}. Error: {}",
                response.status
            )));
        }

        let zone: models::Timezone = response.json()?;
        let offset = format::offset_from_seconds(zone.timezone);
        Ok(ToolResult::success(format::local_time_report(city, now, offset)))
    }

    /// Current-weather lookup without units, used for coordinates and offset.
    async fn locate(&self, city: &str, key: &str) -> Result<ApiResponse> {
        self.backend
            .get(
                "weather",
                &[("q", city.to_string()), ("appid", key.to_string())],
            )
            .await
    }
}
