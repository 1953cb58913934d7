use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeatherError};

pub const DEFAULT_WEATHER_API_BASE: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_query(self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub fn temperature_symbol(self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }

    pub fn speed_unit(self) -> &'static str {
        match self {
            Units::Metric => "m/s",
            Units::Imperial => "mph",
        }
    }
}

impl FromStr for Units {
    type Err = WeatherError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            other => Err(WeatherError::Config(format!("unknown units `{other}`"))),
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_weather_base")]
    pub base_url: String,
    #[serde(default)]
    pub units: Units,
    /// Unset means requests wait for as long as the provider takes.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base(),
            units: Units::default(),
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

impl WeatherConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// The key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

fn default_weather_base() -> String {
    DEFAULT_WEATHER_API_BASE.into()
}

fn default_user_agent() -> String {
    "weather-app/1.0".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

fn default_server_name() -> String {
    "weather-mcp-server".into()
}

fn default_server_version() -> String {
    "0.1.0".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_base")]
    pub base_url: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: default_gemini_base(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_gemini_base() -> String {
    DEFAULT_GEMINI_API_BASE.into()
}

fn default_max_steps() -> usize {
    6
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| WeatherError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// Reads `path` when given, otherwise starts from defaults; the
    /// environment wins either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_env_or_file(path),
            None => Self::from_env(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(key) = env::var("OPENWEATHERMAP_API_KEY") {
            self.weather.api_key = Some(key);
        }
        if let Ok(base) = env::var("OPENWEATHERMAP_API_BASE") {
            self.weather.base_url = base;
        }
        if let Ok(units) = env::var("WEATHER_UNITS") {
            self.weather.units = units.parse()?;
        }
        if let Ok(timeout) = env::var("WEATHER_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.weather.timeout_secs = Some(parsed);
            }
        }
        if let Ok(key) = env::var("GOOGLE_API_KEY") {
            self.agent.api_key = Some(key);
        }
        if let Ok(model) = env::var("WEATHER_AGENT_MODEL") {
            self.agent.model = model;
        }
        if let Ok(json) = env::var("WEATHER_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.logging.json = parsed;
            }
        }
        Ok(())
    }
}
