use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::models::Topic;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    /// A topic is refreshed in the background once its last successful fetch
    /// is older than this.
    pub auto_update_interval_secs: u64,
    /// Period of the background update poller.
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
    pub max_posts_per_topic: usize,
    pub update_channel_capacity: usize,
    /// Replay the notifier's last outcome for a topic when its repository
    /// starts after the outcome was published.
    pub replay_last_update: bool,
    /// topic -> feed url
    pub sources: BTreeMap<Topic, String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            auto_update_interval_secs: 600,
            poll_interval_secs: 300,
            request_timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 250,
            max_posts_per_topic: 100,
            update_channel_capacity: 64,
            replay_last_update: false,
            sources: BTreeMap::new(),
        }
    }
}

impl RepositoryConfig {
    /// Loads the config, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn try_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_from_dir(dir: impl AsRef<Path>) -> Self {
        Self::from_file(Self::file_in(dir))
    }

    pub fn file_in(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(CONFIG_FILE_NAME)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        // write then rename so a crash never leaves half a file behind
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn auto_update_interval(&self) -> Duration {
        Duration::from_secs(self.auto_update_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn with_source(mut self, topic: impl Into<Topic>, url: impl Into<String>) -> Self {
        self.sources.insert(topic.into(), url.into());
        self
    }
}
