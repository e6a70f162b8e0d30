use retone_rs::automation::RecommendedDelays;
use retone_rs::config::parse_config;
use retone_rs::{Config, ConfigManager, DelaySettings};
use std::fs;
use std::time::Duration;

#[test]
fn default_config_round_trips() {
    let config = Config::default();
    let json = serde_json::to_string_pretty(&config).expect("serialize config");
    let decoded: Config = serde_json::from_str(&json).expect("deserialize config");
    assert_eq!(decoded, config);
}

#[test]
fn jsonc_comments_and_trailing_commas_are_accepted() {
    let text = r#"
        // tuned on the work laptop
        {
            "automation": {
                "clipboard_sync_delay_ms": 125, /* measured */
                "selection_delay_ms": 80,
            },
            "shortcuts": { "fix_field": null },
        }
    "#;
    let config = parse_config(text).expect("parse jsonc");
    assert_eq!(config.automation.clipboard_sync_delay_ms, Some(125.0));
    assert_eq!(config.automation.selection_delay_ms, Some(80.0));
    assert_eq!(config.fix_field_shortcut(), None);
    assert_eq!(config.fix_selection_shortcut(), Some("SUPER+ALT+G"));
    assert_eq!(config.rewrite, Config::default().rewrite);
}

#[test]
fn empty_document_falls_back_to_defaults() {
    assert_eq!(
        parse_config("// nothing here\n").unwrap(),
        Config::default()
    );
}

#[test]
fn invalid_delays_normalize_to_fallbacks() {
    let config = parse_config(
        r#"{"automation": {"clipboard_sync_delay_ms": -40, "selection_delay_ms": null}}"#,
    )
    .unwrap();
    let delays = DelaySettings::from_config(&config.automation);
    assert_eq!(delays.clipboard_sync_delay, Duration::ZERO);
    assert_eq!(delays.selection_delay, Duration::from_millis(100));
}

#[test]
fn fractional_delays_are_rounded() {
    let config =
        parse_config(r#"{"automation": {"clipboard_sync_delay_ms": 87.6}}"#).unwrap();
    let delays = DelaySettings::from_config(&config.automation);
    assert_eq!(delays.clipboard_sync_delay_ms(), 88);
}

#[tokio::test]
async fn missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retone").join("config.jsonc");

    let manager = ConfigManager::load_from(path.clone()).unwrap();

    assert!(path.exists());
    assert_eq!(manager.get(), Config::default());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("//"));
    assert_eq!(parse_config(&written).unwrap(), Config::default());
}

#[tokio::test]
async fn recommended_delays_are_persisted_and_published() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.jsonc");
    let manager = ConfigManager::load_from(path.clone()).unwrap();
    let mut updates = manager.subscribe();

    manager
        .save_recommended_delays(&RecommendedDelays {
            clipboard_sync_delay_ms: 75,
            selection_delay_ms: 120,
        })
        .unwrap();

    assert!(updates.has_changed().unwrap());
    let published = updates.borrow_and_update().clone();
    assert_eq!(published.automation.clipboard_sync_delay_ms, Some(75.0));

    let reloaded = ConfigManager::load_from(path).unwrap().get();
    assert_eq!(reloaded.automation.clipboard_sync_delay_ms, Some(75.0));
    assert_eq!(reloaded.automation.selection_delay_ms, Some(120.0));
}

#[test]
fn unreadable_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.jsonc");
    fs::write(&path, "{ \"automation\": ").unwrap();

    let err = ConfigManager::load_from(path).err().expect("parse error");
    assert!(format!("{err:#}").contains("config.jsonc"));
}
