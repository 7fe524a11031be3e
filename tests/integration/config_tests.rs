use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use maildedup::config::{Config, ConfigError, ConfigOverrides};
use maildedup::duplicates::{EncodingPolicy, Strategy};
use maildedup::mailbox::BoxFormat;
use maildedup::message::{BodyHashing, TimeSource};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.time_source, TimeSource::DateHeader);
    assert_eq!(config.encoding_policy, EncodingPolicy::RejectSet);
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("MAILDEDUP_SIZE_THRESHOLD", "-1");
    std::env::set_var("MAILDEDUP_SHOW_DIFF", "true");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("MAILDEDUP_").split("__"))
        .extract()
        .unwrap();

    assert_eq!(config.size_threshold, -1);
    assert!(config.show_diff);

    std::env::remove_var("MAILDEDUP_SIZE_THRESHOLD");
    std::env::remove_var("MAILDEDUP_SHOW_DIFF");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
hash_headers = ["Message-ID", "Subject"]
minimal_headers = 1
hash_body = "raw"
strategy = "discard-older"
time_source = "store"
input_format = "maildir"
threads = 8
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.hash_headers, vec!["Message-ID", "Subject"]);
    assert_eq!(config.minimal_headers, 1);
    assert_eq!(config.hash_body, BodyHashing::Raw);
    assert_eq!(config.strategy, Some(Strategy::KeepNewest));
    assert_eq!(config.time_source, TimeSource::Store);
    assert_eq!(config.input_format, Some(BoxFormat::Maildir));
    assert_eq!(config.threads, 8);
    assert_eq!(config.size_threshold, 512);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_with_overrides_over_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "strategy = \"keep-oldest\"\ncontent_threshold = 100\n",
    )
    .unwrap();

    let overrides = ConfigOverrides {
        strategy: Some(Strategy::KeepBiggest),
        ..ConfigOverrides::default()
    };
    let config = Config::load_with_overrides(Some(&config_path), &overrides).unwrap();

    assert_eq!(config.strategy, Some(Strategy::KeepBiggest));
    assert_eq!(config.content_threshold, 100);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    match Config::load(Some(&missing)) {
        Err(ConfigError::FileNotFound(path)) => assert_eq!(path, missing),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_unknown_strategy_in_file_fails_to_load() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "strategy = \"delete-everything\"\n").unwrap();

    let result = Config::load(Some(&config_path));
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn test_wrong_value_type_fails_to_load() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "threads = \"many\"\n").unwrap();

    assert!(matches!(
        Config::load(Some(&config_path)),
        Err(ConfigError::Load(_))
    ));
}

#[test]
fn test_saved_config_loads_back() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("saved.toml");
    let config = Config {
        strategy: Some(Strategy::DiscardNonMatchingPath),
        regexp: Some("/keep/".to_string()),
        fallback_charsets: vec!["windows-1252".to_string()],
        ..Config::default()
    };
    config.save(&config_path).unwrap();

    let loaded: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.validate().is_ok());
}
