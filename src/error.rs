use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeatherError>;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mcp error: {0}")]
    Mcp(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WeatherError {
    pub(crate) fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        WeatherError::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}
