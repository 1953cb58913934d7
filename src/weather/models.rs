//! Response payloads of the OpenWeatherMap 2.5 API, reduced to the fields the
//! tools read. Readings are kept as `serde_json::Number` where the report
//! should print them exactly as the provider sent them.

use serde::Deserialize;
use serde_json::Number;

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainReadings {
    pub temp: Number,
    pub humidity: Number,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wind {
    pub speed: Number,
}

/// `GET /weather`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub main: MainReadings,
    pub wind: Wind,
}

impl CurrentWeather {
    pub fn description(&self) -> &str {
        self.weather
            .first()
            .map(|c| c.description.as_str())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

/// The slice of `GET /weather` used to locate a city. `timezone` is the
/// city's offset from UTC in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub coord: Coord,
    #[serde(default)]
    pub timezone: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timezone {
    pub timezone: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastReadings {
    pub temp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastEntry {
    pub dt: i64,
    pub main: ForecastReadings,
    #[serde(default)]
    pub weather: Vec<Condition>,
    /// Probability of precipitation, 0..=1.
    #[serde(default)]
    pub pop: f64,
}

impl ForecastEntry {
    pub fn description(&self) -> &str {
        self.weather
            .first()
            .map(|c| c.description.as_str())
            .unwrap_or("Unknown")
    }
}

/// `GET /forecast`
#[derive(Debug, Clone, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub list: Vec<ForecastEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub event: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub description: String,
}

/// `GET /onecall` with everything but alerts excluded.
#[derive(Debug, Clone, Deserialize)]
pub struct OneCallAlerts {
    #[serde(default)]
    pub alerts: Option<Vec<Alert>>,
}
