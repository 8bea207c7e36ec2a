#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use topic_core::{
    ContentList, DispatchTable, FetchPostCount, FetchPosts, FetchPostsWithCount, Post,
    RepositoryConfig, RepositoryError, ShouldAutoUpdate, Topic, TopicRepository, UpdateNotifier,
    UseCase,
};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn posts(topic: &str, count: usize) -> ContentList {
    let topic = Topic::new(topic);
    (0..count)
        .map(|i| Post {
            topic: topic.clone(),
            title: format!("{topic} post {i}"),
            summary: None,
            url: format!("http://example.com/{topic}/{i}"),
            published_at: None,
            guid: Some(format!("{topic}-{i}")),
            author: None,
        })
        .collect::<Vec<_>>()
        .into()
}

/// Use cases answering from a script instead of the network.
#[derive(Default)]
pub struct ScriptedUseCases {
    responses: Mutex<VecDeque<Result<ContentList, String>>>,
    delay: Mutex<Option<Duration>>,
    auto_update: AtomicBool,
    ignore_stop: AtomicBool,
    count: Mutex<u64>,
    pub fetch_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    stopped: Notify,
}

impl ScriptedUseCases {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, posts: ContentList) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(posts));
        self
    }

    pub fn fail(&self, reason: &str) -> &Self {
        self.responses.lock().unwrap().push_back(Err(reason.to_owned()));
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_auto_update(&self, value: bool) {
        self.auto_update.store(value, Ordering::SeqCst);
    }

    /// Delayed fetches keep running through `stop`; only an abort ends them.
    pub fn set_ignore_stop(&self, value: bool) {
        self.ignore_stop.store(value, Ordering::SeqCst);
    }

    pub fn set_count(&self, count: u64) {
        *self.count.lock().unwrap() = count;
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    async fn next_response(&self) -> Result<ContentList, RepositoryError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        let cancelled = match delay {
            Some(delay) if self.ignore_stop.load(Ordering::SeqCst) => {
                tokio::time::sleep(delay).await;
                false
            }
            Some(delay) => tokio::select! {
                _ = self.stopped.notified() => true,
                _ = tokio::time::sleep(delay) => false,
            },
            None => false,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if cancelled {
            return Err(RepositoryError::Cancelled);
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(posts)) => Ok(posts),
            Some(Err(reason)) => Err(RepositoryError::Fetch(reason)),
            None => Err(RepositoryError::Fetch("no scripted response".into())),
        }
    }
}

impl UseCase for ScriptedUseCases {
    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.notify_waiters();
    }
}

#[async_trait]
impl FetchPosts for ScriptedUseCases {
    async fn fetch(&self, _topic: &Topic) -> Result<ContentList, RepositoryError> {
        self.next_response().await
    }
}

#[async_trait]
impl FetchPostCount for ScriptedUseCases {
    async fn fetch_count(&self, _topic: &Topic) -> Result<u64, RepositoryError> {
        Ok(*self.count.lock().unwrap())
    }
}

#[async_trait]
impl ShouldAutoUpdate for ScriptedUseCases {
    async fn should_auto_update(&self, _topic: &Topic) -> bool {
        self.auto_update.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchPostsWithCount for ScriptedUseCases {
    async fn fetch_with_count(
        &self,
        topic: &Topic,
    ) -> Result<(ContentList, u64), RepositoryError> {
        let posts = self.fetch(topic).await?;
        let count = *self.count.lock().unwrap();
        Ok((posts, count))
    }
}

pub fn repository(
    topic: &str,
    use_cases: &Arc<ScriptedUseCases>,
    notifier: &UpdateNotifier,
) -> TopicRepository {
    TopicRepository::new(
        Topic::new(topic),
        tokio::runtime::Handle::current(),
        notifier.clone(),
        DispatchTable::from_shared(use_cases.clone()),
        &RepositoryConfig::default(),
    )
}

pub async fn next<T>(subscription: &mut topic_core::Subscription<T>) -> T {
    tokio::time::timeout(WAIT, subscription.recv())
        .await
        .expect("timed out waiting for a value")
        .expect("cell dropped")
}
