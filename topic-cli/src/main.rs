mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reqwest::{redirect, ClientBuilder};
use tokio::runtime::Runtime;
use topic_core::{
    spawn_update_poller, Communication, ContentList, RepositoryConfig,
    RssUseCases, Topic, TopicRegistry, TopicRepositoryFactory, UpdateNotifier,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = load_config(&cli);
    let topics: Vec<Topic> = if cli.topics.is_empty() {
        config.sources.keys().cloned().collect()
    } else {
        cli.topics.iter().map(Topic::new).collect()
    };
    if topics.is_empty() {
        anyhow::bail!("no topics given and no sources configured");
    }
    for topic in &topics {
        if !config.sources.contains_key(topic) {
            warn!(topic = %topic, "no source configured, loads will fail");
        }
    }

    let runtime = Runtime::new().context("failed to initialise Tokio runtime")?;
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(concat!("topicfeed/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let source = Arc::new(RssUseCases::new(client, &config));
    let notifier = UpdateNotifier::new(config.update_channel_capacity);
    let factory = TopicRepositoryFactory::for_rss(
        runtime.handle().clone(),
        notifier.clone(),
        config.clone(),
        source.clone(),
    );
    let registry = TopicRegistry::new(factory);
    let poller = spawn_update_poller(
        runtime.handle(),
        source,
        notifier,
        config.poll_interval(),
    );

    runtime.block_on(async {
        let mut watchers = Vec::with_capacity(topics.len());
        for topic in &topics {
            watchers.push(tokio::spawn(print_snapshots(
                topic.clone(),
                registry.observe(topic).subscribe(),
                cli.show,
            )));
            watchers.push(tokio::spawn(print_communication(
                registry.communication_channel(topic).subscribe(),
            )));
        }
        info!(topics = topics.len(), "watching, press ctrl-c to quit");

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;

        info!("shutting down");
        for watcher in &watchers {
            watcher.abort();
        }
        if let Err(err) = poller.stop().await {
            warn!(error = %err, "update poller did not stop cleanly");
        }
        registry.stop_all().await;
        anyhow::Ok(())
    })
}

async fn print_snapshots(
    topic: Topic,
    mut snapshots: topic_core::Subscription<ContentList>,
    show: usize,
) {
    while let Some(posts) = snapshots.recv().await {
        println!("[{topic}] {} posts", posts.len());
        for post in posts.iter().take(show) {
            let date = post
                .published_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("  {date:16}  {}", post.title);
        }
    }
}

async fn print_communication(mut signals: topic_core::Subscription<Communication>) {
    while let Some(signal) = signals.recv().await {
        match signal {
            Communication::RemoteRequestFailure { topic, reason } => {
                eprintln!("[{topic}] update failed: {reason}");
            }
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter = match cli.log_level {
        Some(level) => EnvFilter::new(level.as_directive()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn config_dir() -> PathBuf {
    // Linux: ~/.config/topicfeed
    let mut dir = dirs::config_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();
    dir.push("topicfeed");
    dir
}

fn load_config(cli: &Cli) -> RepositoryConfig {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| RepositoryConfig::file_in(config_dir()));
    let mut config = if path.exists() {
        RepositoryConfig::from_file(&path)
    } else {
        RepositoryConfig::default()
    };
    for (topic, url) in &cli.sources {
        config.sources.insert(Topic::new(topic), url.clone());
    }
    if let Some(secs) = cli.poll_interval {
        config.poll_interval_secs = secs;
    }
    config
}
