use thiserror::Error;

use crate::models::Topic;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed parsing error: {0}")]
    Parse(#[from] rss::Error),
    #[error("no source configured for topic {0}")]
    UnknownTopic(Topic),
    #[error("operation cancelled")]
    Cancelled,
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("update channel closed unexpectedly")]
    UpdateChannelClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json error: {0}")]
    Json(#[from] serde_json::Error),
}
