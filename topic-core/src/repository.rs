//! Topic-scoped content repository.
//!
//! A [`TopicRepository`] caches the posts of one topic, loads them when its
//! content cell gains its first observer, and reloads them whenever the
//! update notifier reports new or changed content for the topic.
//!
//! # Invariants
//!
//! 1. The cache entry is only ever written while holding its async mutex, so
//!    at most one fetch per topic is in flight and writes land in completion
//!    order.
//! 2. The cache never holds a list that did not come from a successful fetch.
//! 3. Every publish on the content cell is the value just read from or
//!    written to the cache, in the same critical section.
//! 4. Failures never reach the content cell; they are published on the
//!    communication channel instead.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cell::ObservableCell;
use crate::config::RepositoryConfig;
use crate::dispatch::DispatchTable;
use crate::error::RepositoryError;
use crate::models::{ContentList, Topic};
use crate::notifier::{UpdateNotifier, UpdateOutcome, UpdateSubscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Started,
}

/// Non-content signals, kept off the content cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Communication {
    RemoteRequestFailure { topic: Topic, reason: String },
}

/// Handle to one background load. Dropping it detaches the task; the
/// repository still tracks it for `wait_idle` and `stop`.
#[derive(Debug)]
pub struct LoadHandle {
    abort: AbortHandle,
    done: oneshot::Receiver<()>,
}

impl LoadHandle {
    /// Waits for the load to finish. Errors with `Cancelled` when the task was
    /// aborted before completing.
    pub async fn wait(self) -> Result<(), RepositoryError> {
        self.done.await.map_err(|_| RepositoryError::Cancelled)
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

struct Lifecycle {
    state: LifecycleState,
    listener: Option<JoinHandle<()>>,
    // cell is active but no load has run for the current started period
    activation_pending: bool,
}

struct Inner {
    topic: Topic,
    runtime: Handle,
    notifier: UpdateNotifier,
    use_cases: DispatchTable,
    replay_last_update: bool,
    posts: ObservableCell<ContentList>,
    communication: ObservableCell<Communication>,
    entry: tokio::sync::Mutex<Option<ContentList>>,
    known_count: Mutex<Option<u64>>,
    lifecycle: Mutex<Lifecycle>,
    tasks: Mutex<JoinSet<()>>,
    // bumped by `stop` so `wait_idle` aborts the tasks it has taken out
    stop_signal: watch::Sender<u64>,
    // number of `wait_idle` calls currently holding a taken task set
    draining: watch::Sender<usize>,
}

/// Cheap to clone; clones share the same cache, cells and lifecycle.
#[derive(Clone)]
pub struct TopicRepository {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TopicRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRepository")
            .field("topic", &self.inner.topic)
            .field("state", &self.state())
            .finish()
    }
}

impl TopicRepository {
    /// Creates a stopped repository. Background work runs on `runtime`.
    pub fn new(
        topic: Topic,
        runtime: Handle,
        notifier: UpdateNotifier,
        use_cases: DispatchTable,
        config: &RepositoryConfig,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let posts = ObservableCell::new();
            let on_active = weak.clone();
            let on_inactive = weak.clone();
            posts.set_activation(
                move || {
                    if let Some(inner) = on_active.upgrade() {
                        inner.on_active();
                    }
                },
                move || {
                    if let Some(inner) = on_inactive.upgrade() {
                        inner.on_inactive();
                    }
                },
            );
            Inner {
                topic,
                runtime,
                notifier,
                use_cases,
                replay_last_update: config.replay_last_update,
                posts,
                communication: ObservableCell::new(),
                entry: tokio::sync::Mutex::new(None),
                known_count: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    state: LifecycleState::Stopped,
                    listener: None,
                    activation_pending: false,
                }),
                tasks: Mutex::new(JoinSet::new()),
                stop_signal: watch::channel(0).0,
                draining: watch::channel(0).0,
            }
        });
        Self { inner }
    }

    pub fn topic(&self) -> &Topic {
        &self.inner.topic
    }

    pub fn state(&self) -> LifecycleState {
        lock(&self.inner.lifecycle).state
    }

    /// Registers for update outcomes and serves activations. Calling it while
    /// started does nothing. A stopped repository can be started again.
    pub fn start(&self) {
        let inner = &self.inner;
        let mut lifecycle = lock(&inner.lifecycle);
        if lifecycle.state == LifecycleState::Started {
            debug!(topic = %inner.topic, "repository already started");
            return;
        }

        let subscription = if inner.replay_last_update {
            inner.notifier.subscribe_with_replay(inner.topic.clone())
        } else {
            inner.notifier.subscribe(inner.topic.clone())
        };
        let listener = inner
            .runtime
            .spawn(listen_for_updates(Arc::downgrade(inner), subscription));
        lifecycle.listener = Some(listener);
        lifecycle.state = LifecycleState::Started;
        info!(topic = %inner.topic, "repository started");

        if std::mem::take(&mut lifecycle.activation_pending) {
            inner.spawn_tracked(Inner::load_posts);
        }
    }

    /// Stops every use case, deregisters from the notifier, then cancels and
    /// joins the background loads this repository launched.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let listener = {
            let mut lifecycle = lock(&inner.lifecycle);
            lifecycle.state = LifecycleState::Stopped;
            lifecycle.activation_pending = inner.posts.is_active();
            lifecycle.listener.take()
        };

        inner.use_cases.stop();

        if let Some(listener) = listener {
            listener.abort();
            let _ = listener.await;
        }

        let mut tasks = {
            let mut tracked = lock(&inner.tasks);
            inner.stop_signal.send_modify(|generation| *generation += 1);
            std::mem::take(&mut *tracked)
        };
        tasks.abort_all();
        while let Some(result) = tasks.join_next().await {
            log_join_result(&inner.topic, result);
        }
        // sets taken by `wait_idle` are aborted and drained by their holders
        let mut draining = inner.draining.subscribe();
        let _ = draining.wait_for(|holders| *holders == 0).await;
        info!(topic = %inner.topic, "repository stopped");
    }

    /// Content snapshots for this topic. Observing it triggers the load. A
    /// new subscriber receives the retained snapshot first; a cache hit does
    /// not publish that same snapshot again.
    pub fn observe(&self) -> ObservableCell<ContentList> {
        self.inner.posts.clone()
    }

    pub fn communication_channel(&self) -> ObservableCell<Communication> {
        self.inner.communication.clone()
    }

    /// Current cache entry; `None` until a fetch succeeded.
    pub async fn cached(&self) -> Option<ContentList> {
        self.inner.entry.lock().await.clone()
    }

    pub fn known_count(&self) -> Option<u64> {
        *lock(&self.inner.known_count)
    }

    /// Serves the cache if it holds posts, fetches otherwise, then refreshes
    /// in the background when the topic is due for an automatic update.
    pub fn load(&self) -> LoadHandle {
        self.inner.spawn_tracked(Inner::load_posts)
    }

    /// Fetches unconditionally and overwrites the cache entry.
    pub fn reload(&self) -> LoadHandle {
        self.inner.spawn_tracked(Inner::reload_posts)
    }

    /// Like [`reload`](Self::reload), also recording the total post count.
    pub fn reload_with_count(&self) -> LoadHandle {
        self.inner.spawn_tracked(Inner::reload_posts_with_count)
    }

    pub async fn fetch_count(&self) -> Result<u64, RepositoryError> {
        let inner = &self.inner;
        let count = inner.use_cases.fetch_count().fetch_count(&inner.topic).await?;
        *lock(&inner.known_count) = Some(count);
        Ok(count)
    }

    /// Waits until every tracked background load, including ones started
    /// while waiting, has finished. A concurrent [`stop`](Self::stop) aborts
    /// the loads being waited on and ends the wait.
    pub async fn wait_idle(&self) {
        let inner = &self.inner;
        let mut stopped = inner.stop_signal.subscribe();
        loop {
            let (_holder, mut tasks) = {
                let mut tracked = lock(&inner.tasks);
                if tracked.is_empty() {
                    return;
                }
                (DrainHolder::new(&inner.draining), std::mem::take(&mut *tracked))
            };
            let mut interrupted = false;
            loop {
                tokio::select! {
                    joined = tasks.join_next() => match joined {
                        Some(result) => log_join_result(&inner.topic, result),
                        None => break,
                    },
                    _ = stopped.changed(), if !interrupted => {
                        tasks.abort_all();
                        interrupted = true;
                    }
                }
            }
            if interrupted {
                return;
            }
        }
    }
}

impl Inner {
    fn on_active(self: &Arc<Self>) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state == LifecycleState::Started {
            debug!(topic = %self.topic, "content cell active, loading");
            self.spawn_tracked(Inner::load_posts);
        } else {
            debug!(topic = %self.topic, "content cell active while stopped, deferring load");
            lifecycle.activation_pending = true;
        }
    }

    fn on_inactive(&self) {
        lock(&self.lifecycle).activation_pending = false;
        // in-flight loads keep running and still update the cache
        debug!(topic = %self.topic, "content cell inactive");
    }

    fn on_update(self: &Arc<Self>, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::New | UpdateOutcome::Changed => {
                debug!(topic = %self.topic, ?outcome, "remote update, reloading");
                self.spawn_tracked(Inner::reload_posts);
            }
            UpdateOutcome::Unchanged => {
                debug!(topic = %self.topic, "remote update reported no changes");
            }
            UpdateOutcome::Failed(reason) => {
                warn!(topic = %self.topic, %reason, "remote update failed");
                self.communication.publish(Communication::RemoteRequestFailure {
                    topic: self.topic.clone(),
                    reason,
                });
            }
        }
    }

    fn spawn_tracked<F, Fut>(self: &Arc<Self>, work: F) -> LoadHandle
    where
        F: FnOnce(Arc<Inner>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let fut = work(Arc::clone(self));
        let mut tasks = lock(&self.tasks);
        while let Some(result) = tasks.try_join_next() {
            log_join_result(&self.topic, result);
        }
        let abort = tasks.spawn_on(
            async move {
                fut.await;
                let _ = done_tx.send(());
            },
            &self.runtime,
        );
        LoadHandle {
            abort,
            done: done_rx,
        }
    }

    async fn load_posts(self: Arc<Self>) {
        let refresh = self
            .use_cases
            .should_auto_update()
            .should_auto_update(&self.topic)
            .await;

        {
            let mut entry = self.entry.lock().await;
            let cached = entry.as_ref().filter(|posts| !posts.is_empty()).cloned();
            match cached {
                // subscribers already got the retained value on subscribe
                Some(posts) if self.posts.value().as_ref() == Some(&posts) => {
                    debug!(topic = %self.topic, posts = posts.len(), "cached posts already published");
                }
                Some(posts) => {
                    debug!(topic = %self.topic, posts = posts.len(), "serving cached posts");
                    self.posts.publish(posts);
                }
                None => self.fetch_into(&mut entry).await,
            }
        }

        if refresh {
            debug!(topic = %self.topic, "topic due for automatic update");
            let mut entry = self.entry.lock().await;
            self.fetch_into(&mut entry).await;
        }
    }

    async fn reload_posts(self: Arc<Self>) {
        let mut entry = self.entry.lock().await;
        self.fetch_into(&mut entry).await;
    }

    async fn reload_posts_with_count(self: Arc<Self>) {
        let mut entry = self.entry.lock().await;
        match self.use_cases.fetch_with_count().fetch_with_count(&self.topic).await {
            Ok((posts, count)) => {
                *lock(&self.known_count) = Some(count);
                self.store_and_publish(&mut entry, posts);
            }
            Err(err) => self.report_failure(err),
        }
    }

    async fn fetch_into(&self, entry: &mut Option<ContentList>) {
        match self.use_cases.fetch_posts().fetch(&self.topic).await {
            Ok(posts) => self.store_and_publish(entry, posts),
            Err(err) => self.report_failure(err),
        }
    }

    fn store_and_publish(&self, entry: &mut Option<ContentList>, posts: ContentList) {
        debug!(topic = %self.topic, posts = posts.len(), "cache updated");
        *entry = Some(posts.clone());
        self.posts.publish(posts);
    }

    fn report_failure(&self, err: RepositoryError) {
        if matches!(err, RepositoryError::Cancelled) {
            debug!(topic = %self.topic, "fetch cancelled");
            return;
        }
        warn!(topic = %self.topic, error = %err, "failed to fetch posts");
        self.communication.publish(Communication::RemoteRequestFailure {
            topic: self.topic.clone(),
            reason: err.to_string(),
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(listener) = lifecycle.listener.take() {
            listener.abort();
        }
    }
}

async fn listen_for_updates(repository: Weak<Inner>, mut subscription: UpdateSubscription) {
    loop {
        let outcome = match subscription.recv().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(topic = %subscription.topic(), error = %err, "update listener stopped");
                break;
            }
        };
        let Some(inner) = repository.upgrade() else {
            break;
        };
        inner.on_update(outcome);
    }
}

/// Counts a `wait_idle` call as holding a task set until dropped.
struct DrainHolder<'a>(&'a watch::Sender<usize>);

impl<'a> DrainHolder<'a> {
    fn new(draining: &'a watch::Sender<usize>) -> Self {
        draining.send_modify(|holders| *holders += 1);
        Self(draining)
    }
}

impl Drop for DrainHolder<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|holders| *holders -= 1);
    }
}

fn log_join_result(topic: &Topic, result: Result<(), JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            error!(topic = %topic, error = %err, "background load panicked");
        } else {
            debug!(topic = %topic, "background load cancelled");
        }
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
