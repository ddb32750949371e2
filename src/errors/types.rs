use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayraceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Request build error: {0}")]
    RequestBuild(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Response body error: {0}")]
    Body(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<reqwest::Error> for PayraceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PayraceError::Timeout(err.to_string())
        } else if err.is_builder() {
            PayraceError::RequestBuild(err.to_string())
        } else if err.is_body() || err.is_decode() {
            PayraceError::Body(err.to_string())
        } else {
            PayraceError::Network(err.to_string())
        }
    }
}
