pub mod cell;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod models;
pub mod notifier;
pub mod poller;
pub mod registry;
pub mod repository;

pub use cell::{ObservableCell, Subscription};
pub use config::RepositoryConfig;
pub use dispatch::{
    DispatchTable, FetchPostCount, FetchPosts, FetchPostsWithCount, ShouldAutoUpdate, UseCase,
    UseCaseKind,
};
pub use error::{ConfigError, RepositoryError};
pub use feed::RssUseCases;
pub use models::{ContentList, Post, Topic};
pub use notifier::{TopicUpdate, UpdateNotifier, UpdateOutcome, UpdateSubscription};
pub use poller::{poll_all, spawn_update_poller, PollerHandle};
pub use registry::{TopicRegistry, TopicRepositoryFactory};
pub use repository::{Communication, LifecycleState, LoadHandle, TopicRepository};
