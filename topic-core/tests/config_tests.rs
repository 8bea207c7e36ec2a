use topic_core::{RepositoryConfig, Topic};

fn temp_dir(tag: &str) -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "topicfeed_{tag}_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn corrupted_config_falls_back_to_defaults() {
    let dir = temp_dir("corrupt");
    std::fs::write(RepositoryConfig::file_in(&dir), b"{ this is not json ").unwrap();

    let config = RepositoryConfig::load_from_dir(&dir);
    assert_eq!(config, RepositoryConfig::default());
    assert!(RepositoryConfig::try_from_file(RepositoryConfig::file_in(&dir)).is_err());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn saved_config_is_loaded_back() {
    let dir = temp_dir("save");
    let mut config = RepositoryConfig::default().with_source("news", "http://example.com/news.xml");
    config.replay_last_update = true;
    config.auto_update_interval_secs = 30;

    config.save(RepositoryConfig::file_in(&dir)).unwrap();
    let loaded = RepositoryConfig::load_from_dir(&dir);

    assert_eq!(loaded, config);
    assert_eq!(
        loaded.sources.get(&Topic::new("news")).map(String::as_str),
        Some("http://example.com/news.xml")
    );
    assert!(!dir.join("config.json.tmp").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_fields_take_defaults() {
    let config: RepositoryConfig =
        serde_json::from_str(r#"{ "max_retries": 5, "sources": { "news": "http://e/n" } }"#)
            .unwrap();

    assert_eq!(config.max_retries, 5);
    assert_eq!(config.request_timeout_secs, RepositoryConfig::default().request_timeout_secs);
    assert_eq!(config.sources.len(), 1);
}
