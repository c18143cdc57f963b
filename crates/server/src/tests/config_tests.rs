use super::{normalize_database_url, prepare_database_url, resolve_settings, Settings};

use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    assert_eq!(resolve_settings(None, env_of(&[])), Settings::default());
}

#[test]
fn file_values_override_defaults() {
    let file = r#"
        bind_addr = "0.0.0.0:9000"
        database_url = "sqlite://./site.db"
        max_body_bytes = 1024
    "#;
    let settings = resolve_settings(Some(file), env_of(&[]));
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.database_url, "sqlite://./site.db");
    assert_eq!(settings.max_body_bytes, 1024);
}

#[test]
fn env_overrides_file_and_app_prefix_wins() {
    let file = r#"bind_addr = "0.0.0.0:9000""#;
    let settings = resolve_settings(
        Some(file),
        env_of(&[
            ("SERVER_BIND", "127.0.0.1:1"),
            ("APP__BIND_ADDR", "127.0.0.1:2"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("APP__MAX_BODY_BYTES", "2048"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:2");
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.max_body_bytes, 2048);
}

#[test]
fn malformed_inputs_keep_defaults() {
    let settings = resolve_settings(
        Some("this is = = not toml"),
        env_of(&[("APP__MAX_BODY_BYTES", "lots")]),
    );
    assert_eq!(settings, Settings::default());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn creates_parent_dir_for_sqlite_path() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.path().join("data").exists());
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}
