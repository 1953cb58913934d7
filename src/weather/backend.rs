use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::WeatherConfig;
use crate::error::{Result, WeatherError};

/// Status and raw body of one provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    /// Only 200 counts; the provider signals everything else as a failure.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// One GET against the weather provider, relative to its base URL.
#[async_trait]
pub trait WeatherBackend: Send + Sync {
    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<ApiResponse>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WeatherBackend for HttpBackend {
    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        // appid is in the query string, so errors drop the url and only the endpoint is logged
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;
        debug!(endpoint, status, "weather provider responded");

        Ok(ApiResponse { status, body })
    }
}

/// A recorded request: endpoint plus query pairs.
pub type RecordedRequest = (String, Vec<(String, String)>);

/// Replays canned responses in order and records what was asked.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<ApiResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WeatherBackend for ScriptedBackend {
    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((
                endpoint.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ));
        }

        self.responses
            .lock()
            .map_err(|_| WeatherError::Protocol("scripted backend poisoned".into()))?
            .pop_front()
            .ok_or_else(|| WeatherError::Protocol("scripted backend ran out of responses".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_200_is_ok() {
        assert!(ApiResponse::ok(json!({})).is_ok());
        assert!(!ApiResponse::status(201).is_ok());
        assert!(!ApiResponse::status(404).is_ok());
    }

    #[tokio::test]
    async fn scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new(vec![ApiResponse::status(500), ApiResponse::ok(json!({"a": 1}))]);

        let first = backend.get("weather", &[("q", "Oslo".into())]).await.unwrap();
        let second = backend.get("forecast", &[]).await.unwrap();
        assert_eq!(first.status, 500);
        assert_eq!(second.json::<Value>().unwrap()["a"], 1);
        assert!(backend.get("weather", &[]).await.is_err());

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].0, "weather");
        assert_eq!(requests[0].1, vec![("q".to_string(), "Oslo".to_string())]);
    }

    #[test]
    fn http_backend_trims_base_url() {
        let config = WeatherConfig::default().with_base_url("http://localhost:9/data/");
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.base_url, "http://localhost:9/data");
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_api_key() {
        let config = WeatherConfig::default().with_base_url("http://127.0.0.1:1/data/2.5");
        let backend = HttpBackend::new(&config).unwrap();
        let err = backend
            .get(
                "weather",
                &[("q", "Paris".to_string()), ("appid", "SUPERSECRET123".to_string())],
            )
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(!message.contains("SUPERSECRET123"), "{message}");
        assert!(!message.contains("appid"), "{message}");
    }
}
