use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cell::ObservableCell;
use crate::config::RepositoryConfig;
use crate::dispatch::DispatchTable;
use crate::feed::RssUseCases;
use crate::models::{ContentList, Topic};
use crate::notifier::UpdateNotifier;
use crate::repository::{Communication, TopicRepository};

type UseCaseBuilder = Arc<dyn Fn(&Topic) -> DispatchTable + Send + Sync>;

/// Builds repositories that share one runtime and notifier. Each repository
/// gets its own dispatch table from `use_cases`, so stopping one repository
/// never cancels another one's work.
#[derive(Clone)]
pub struct TopicRepositoryFactory {
    runtime: Handle,
    notifier: UpdateNotifier,
    use_cases: UseCaseBuilder,
    config: RepositoryConfig,
}

impl TopicRepositoryFactory {
    pub fn new<B>(
        runtime: Handle,
        notifier: UpdateNotifier,
        config: RepositoryConfig,
        use_cases: B,
    ) -> Self
    where
        B: Fn(&Topic) -> DispatchTable + Send + Sync + 'static,
    {
        Self {
            runtime,
            notifier,
            use_cases: Arc::new(use_cases),
            config,
        }
    }

    /// Factory whose repositories each get a [`RssUseCases::scoped`] handle
    /// over the shared `source`.
    pub fn for_rss(
        runtime: Handle,
        notifier: UpdateNotifier,
        config: RepositoryConfig,
        source: Arc<RssUseCases>,
    ) -> Self {
        Self::new(runtime, notifier, config, move |_topic: &Topic| {
            DispatchTable::from_shared(Arc::new(source.scoped()))
        })
    }

    pub fn create(&self, topic: Topic) -> TopicRepository {
        let use_cases = (self.use_cases)(&topic);
        debug!(topic = %topic, "creating repository");
        TopicRepository::new(
            topic,
            self.runtime.clone(),
            self.notifier.clone(),
            use_cases,
            &self.config,
        )
    }

    pub fn notifier(&self) -> &UpdateNotifier {
        &self.notifier
    }
}

impl fmt::Debug for TopicRepositoryFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRepositoryFactory")
            .field("notifier", &self.notifier)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One started repository per topic, created on first use.
#[derive(Debug)]
pub struct TopicRegistry {
    factory: TopicRepositoryFactory,
    repositories: Mutex<HashMap<Topic, TopicRepository>>,
}

impl TopicRegistry {
    pub fn new(factory: TopicRepositoryFactory) -> Self {
        Self {
            factory,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self, topic: &Topic) -> TopicRepository {
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        repositories
            .entry(topic.clone())
            .or_insert_with(|| {
                let repository = self.factory.create(topic.clone());
                repository.start();
                repository
            })
            .clone()
    }

    pub fn observe(&self, topic: &Topic) -> ObservableCell<ContentList> {
        self.repository(topic).observe()
    }

    pub fn communication_channel(&self, topic: &Topic) -> ObservableCell<Communication> {
        self.repository(topic).communication_channel()
    }

    pub fn topics(&self) -> Vec<Topic> {
        let repositories = self
            .repositories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut topics: Vec<Topic> = repositories.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn stop_all(&self) {
        let repositories: Vec<TopicRepository> = {
            let repositories = self
                .repositories
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            repositories.values().cloned().collect()
        };
        for repository in &repositories {
            repository.stop().await;
        }
        info!(count = repositories.len(), "all repositories stopped");
    }
}
