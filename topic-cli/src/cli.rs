use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(
    name = "topicfeed",
    version,
    about = "Watch topic-scoped feeds and print every content snapshot"
)]
pub struct Cli {
    /// Topics to watch. Defaults to every topic with a configured source.
    #[arg(value_name = "TOPIC")]
    pub topics: Vec<String>,

    /// Config file (defaults to <config dir>/topicfeed/config.json).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Extra feed source, as TOPIC=URL. Overrides the config file.
    #[arg(long = "source", value_name = "TOPIC=URL", value_parser = parse_source)]
    pub sources: Vec<(String, String)>,

    /// Override the background poll interval, in seconds.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Number of post titles printed per snapshot.
    #[arg(long, default_value_t = 5)]
    pub show: usize,

    /// Explicit log level (overrides RUST_LOG).
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevelArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevelArg::Error => "error",
            LogLevelArg::Warn => "warn",
            LogLevelArg::Info => "info",
            LogLevelArg::Debug => "debug",
            LogLevelArg::Trace => "trace",
        }
    }
}

fn parse_source(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((topic, url)) if !topic.is_empty() && !url.is_empty() => {
            Ok((topic.to_owned(), url.to_owned()))
        }
        _ => Err(format!("expected TOPIC=URL, got `{value}`")),
    }
}
