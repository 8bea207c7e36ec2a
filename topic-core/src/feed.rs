//! Use cases backed by RSS feeds over HTTP.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::RepositoryConfig;
use crate::dispatch::{FetchPostCount, FetchPosts, FetchPostsWithCount, ShouldAutoUpdate, UseCase};
use crate::error::RepositoryError;
use crate::models::{ContentList, Post, Topic};
use crate::notifier::{UpdateNotifier, UpdateOutcome};

/// RSS use cases. Clients, sources, fetch times and poll history are shared
/// between every handle made with [`scoped`](Self::scoped); stopping a
/// handle only cancels the fetches started through that handle.
#[derive(Debug)]
pub struct RssUseCases {
    feeds: Arc<FeedState>,
    stop_generation: watch::Sender<u64>,
}

#[derive(Debug)]
struct FeedState {
    client: Client,
    sources: BTreeMap<Topic, String>,
    request_timeout: Duration,
    max_retries: u8,
    retry_backoff: Duration,
    max_posts: usize,
    auto_update_interval: Duration,
    last_fetched: Mutex<HashMap<Topic, DateTime<Utc>>>,
    // identities seen by the previous poll, per topic
    seen: Mutex<HashMap<Topic, HashSet<String>>>,
}

impl RssUseCases {
    pub fn new(client: Client, config: &RepositoryConfig) -> Self {
        let feeds = FeedState {
            client,
            sources: config.sources.clone(),
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            max_posts: config.max_posts_per_topic,
            auto_update_interval: config.auto_update_interval(),
            last_fetched: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashMap::new()),
        };
        Self::with_feeds(Arc::new(feeds))
    }

    fn with_feeds(feeds: Arc<FeedState>) -> Self {
        let (stop_generation, _) = watch::channel(0);
        Self {
            feeds,
            stop_generation,
        }
    }

    /// New handle over the same feeds with its own stop scope, one per
    /// repository.
    pub fn scoped(&self) -> Self {
        Self::with_feeds(Arc::clone(&self.feeds))
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.feeds.sources.keys().cloned().collect()
    }

    pub fn last_fetched(&self, topic: &Topic) -> Option<DateTime<Utc>> {
        lock(&self.feeds.last_fetched).get(topic).copied()
    }

    /// Fetches `topic`, compares it with the previous poll and publishes the
    /// resulting outcome on `notifier`.
    pub async fn poll_topic(&self, topic: &Topic, notifier: &UpdateNotifier) -> UpdateOutcome {
        let outcome = match self.fetch_posts(topic).await {
            Ok(posts) => self.diff_with_previous(topic, &posts),
            Err(RepositoryError::Cancelled) => {
                debug!(topic = %topic, "poll cancelled");
                return UpdateOutcome::Unchanged;
            }
            Err(err) => UpdateOutcome::Failed(err.to_string()),
        };
        notifier.publish(topic.clone(), outcome.clone());
        outcome
    }

    fn diff_with_previous(&self, topic: &Topic, posts: &ContentList) -> UpdateOutcome {
        let current: HashSet<String> = posts.iter().map(Post::identity).collect();
        let mut seen = lock(&self.feeds.seen);
        let outcome = match seen.get(topic) {
            None if current.is_empty() => UpdateOutcome::Unchanged,
            None => UpdateOutcome::New,
            Some(previous) if current.iter().any(|id| !previous.contains(id)) => {
                UpdateOutcome::New
            }
            Some(previous) if *previous != current => UpdateOutcome::Changed,
            Some(_) => UpdateOutcome::Unchanged,
        };
        seen.insert(topic.clone(), current);
        outcome
    }

    async fn fetch_posts(&self, topic: &Topic) -> Result<ContentList, RepositoryError> {
        let url = self
            .feeds
            .sources
            .get(topic)
            .ok_or_else(|| RepositoryError::UnknownTopic(topic.clone()))?;

        // subscribing marks the current generation as seen, so only a stop
        // issued after this point cancels the fetch
        let mut stopped = self.stop_generation.subscribe();
        tokio::select! {
            _ = stopped.changed() => Err(RepositoryError::Cancelled),
            result = self.fetch_with_retries(topic, url) => result,
        }
    }

    async fn fetch_with_retries(
        &self,
        topic: &Topic,
        url: &str,
    ) -> Result<ContentList, RepositoryError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(topic, url).await {
                Ok(posts) => {
                    lock(&self.feeds.last_fetched).insert(topic.clone(), Utc::now());
                    return Ok(posts);
                }
                Err(RepositoryError::Network(err)) if attempt < u32::from(self.feeds.max_retries) => {
                    attempt += 1;
                    warn!(topic = %topic, url, attempt, error = %err, "fetch failed, retrying");
                    tokio::time::sleep(self.feeds.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, topic: &Topic, url: &str) -> Result<ContentList, RepositoryError> {
        let feeds = &self.feeds;
        let response = feeds
            .client
            .get(url)
            .timeout(feeds.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        let channel = rss::Channel::read_from(&bytes[..])?;

        let mut posts: Vec<Post> = channel
            .items()
            .iter()
            .map(|item| {
                let mut post = Post::from_rss_item(topic, item);
                if post.published_at.is_none() {
                    post.published_at = Some(Utc::now());
                }
                post
            })
            .collect();
        posts.truncate(feeds.max_posts);
        debug!(topic = %topic, posts = posts.len(), "feed fetched");
        Ok(ContentList::new(posts))
    }
}

impl UseCase for RssUseCases {
    fn stop(&self) {
        self.stop_generation.send_modify(|generation| *generation += 1);
    }
}

#[async_trait]
impl FetchPosts for RssUseCases {
    async fn fetch(&self, topic: &Topic) -> Result<ContentList, RepositoryError> {
        self.fetch_posts(topic).await
    }
}

#[async_trait]
impl FetchPostCount for RssUseCases {
    async fn fetch_count(&self, topic: &Topic) -> Result<u64, RepositoryError> {
        // feeds carry no separate total, the count is what the feed returns
        let posts = self.fetch_posts(topic).await?;
        Ok(posts.len() as u64)
    }
}

#[async_trait]
impl ShouldAutoUpdate for RssUseCases {
    async fn should_auto_update(&self, topic: &Topic) -> bool {
        // a topic never fetched is loaded by the cache miss path instead
        match self.last_fetched(topic) {
            Some(at) => (Utc::now() - at)
                .to_std()
                .map(|elapsed| elapsed >= self.feeds.auto_update_interval)
                .unwrap_or(false),
            None => false,
        }
    }
}

#[async_trait]
impl FetchPostsWithCount for RssUseCases {
    async fn fetch_with_count(
        &self,
        topic: &Topic,
    ) -> Result<(ContentList, u64), RepositoryError> {
        let posts = self.fetch_posts(topic).await?;
        let count = posts.len() as u64;
        Ok((posts, count))
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
