use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("AWS request failed: {0}")]
    Aws(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid marker pattern: {0}")]
    Marker(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
