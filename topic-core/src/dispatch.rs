//! Use cases the repository dispatches its remote work to.
//!
//! Each capability is its own trait so the repository cannot look up an
//! operation that does not exist. All of them share [`UseCase::stop`], which
//! must cancel in-flight work promptly and be safe to call repeatedly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::RepositoryError;
use crate::models::{ContentList, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCaseKind {
    FetchPostsByTopic,
    FetchPostCount,
    ShouldAutoUpdate,
    FetchPostsWithCount,
}

impl UseCaseKind {
    pub const ALL: [UseCaseKind; 4] = [
        UseCaseKind::FetchPostsByTopic,
        UseCaseKind::FetchPostCount,
        UseCaseKind::ShouldAutoUpdate,
        UseCaseKind::FetchPostsWithCount,
    ];
}

impl fmt::Display for UseCaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UseCaseKind::FetchPostsByTopic => "fetch_posts_by_topic",
            UseCaseKind::FetchPostCount => "fetch_post_count",
            UseCaseKind::ShouldAutoUpdate => "should_auto_update",
            UseCaseKind::FetchPostsWithCount => "fetch_posts_with_count",
        };
        f.write_str(name)
    }
}

pub trait UseCase: Send + Sync {
    fn stop(&self);
}

#[async_trait]
pub trait FetchPosts: UseCase {
    async fn fetch(&self, topic: &Topic) -> Result<ContentList, RepositoryError>;
}

#[async_trait]
pub trait FetchPostCount: UseCase {
    async fn fetch_count(&self, topic: &Topic) -> Result<u64, RepositoryError>;
}

/// Cheap, local staleness decision, e.g. time since the last successful fetch.
#[async_trait]
pub trait ShouldAutoUpdate: UseCase {
    async fn should_auto_update(&self, topic: &Topic) -> bool;
}

#[async_trait]
pub trait FetchPostsWithCount: UseCase {
    async fn fetch_with_count(&self, topic: &Topic)
        -> Result<(ContentList, u64), RepositoryError>;
}

/// Fixed mapping from [`UseCaseKind`] to its implementation, built once.
#[derive(Clone)]
pub struct DispatchTable {
    fetch_posts: Arc<dyn FetchPosts>,
    fetch_count: Arc<dyn FetchPostCount>,
    should_auto_update: Arc<dyn ShouldAutoUpdate>,
    fetch_with_count: Arc<dyn FetchPostsWithCount>,
    entries: [(UseCaseKind, Arc<dyn UseCase>); 4],
}

impl DispatchTable {
    pub fn new<F, C, S, W>(
        fetch_posts: Arc<F>,
        fetch_count: Arc<C>,
        should_auto_update: Arc<S>,
        fetch_with_count: Arc<W>,
    ) -> Self
    where
        F: FetchPosts + 'static,
        C: FetchPostCount + 'static,
        S: ShouldAutoUpdate + 'static,
        W: FetchPostsWithCount + 'static,
    {
        let entries: [(UseCaseKind, Arc<dyn UseCase>); 4] = [
            (UseCaseKind::FetchPostsByTopic, fetch_posts.clone()),
            (UseCaseKind::FetchPostCount, fetch_count.clone()),
            (UseCaseKind::ShouldAutoUpdate, should_auto_update.clone()),
            (UseCaseKind::FetchPostsWithCount, fetch_with_count.clone()),
        ];
        Self {
            fetch_posts,
            fetch_count,
            should_auto_update,
            fetch_with_count,
            entries,
        }
    }

    /// Table where one implementation serves every kind.
    pub fn from_shared<U>(use_cases: Arc<U>) -> Self
    where
        U: FetchPosts + FetchPostCount + ShouldAutoUpdate + FetchPostsWithCount + 'static,
    {
        Self::new(
            use_cases.clone(),
            use_cases.clone(),
            use_cases.clone(),
            use_cases,
        )
    }

    pub fn fetch_posts(&self) -> &dyn FetchPosts {
        self.fetch_posts.as_ref()
    }

    pub fn fetch_count(&self) -> &dyn FetchPostCount {
        self.fetch_count.as_ref()
    }

    pub fn should_auto_update(&self) -> &dyn ShouldAutoUpdate {
        self.should_auto_update.as_ref()
    }

    pub fn fetch_with_count(&self) -> &dyn FetchPostsWithCount {
        self.fetch_with_count.as_ref()
    }

    pub fn use_case(&self, kind: UseCaseKind) -> &dyn UseCase {
        let index = match kind {
            UseCaseKind::FetchPostsByTopic => 0,
            UseCaseKind::FetchPostCount => 1,
            UseCaseKind::ShouldAutoUpdate => 2,
            UseCaseKind::FetchPostsWithCount => 3,
        };
        self.entries[index].1.as_ref()
    }

    /// Stops every entry. An implementation registered under several kinds
    /// is stopped once per kind.
    pub fn stop(&self) {
        for (kind, use_case) in &self.entries {
            debug!(use_case = %kind, "stopping use case");
            use_case.stop();
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field(
                "kinds",
                &self.entries.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
            )
            .finish()
    }
}
