use std::fs;
use tempfile::TempDir;

use scout_core::config::{Config, Settings};
use scout_core::types::{BulkOperation, Meta, Record, RecordQuery, RecordType, SoftDeleteMode};
use scout_core::Error;
use serde_json::json;

#[test]
fn settings_defaults_without_files() {
    let tmp = TempDir::new().unwrap();
    let config = Config::load_from(tmp.path(), "test").expect("load");
    let settings = config.settings().expect("settings");

    assert_eq!(settings, Settings::default());
    assert!(!settings.soft_delete);
    assert_eq!(settings.alias_cache_ttl_secs, 300);
    assert_eq!(settings.cursor.chunk_size, 1000);
    assert_eq!(settings.cursor.keep_alive, "5m");
}

#[test]
fn env_file_overrides_base_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("scout.toml"), "soft_delete = true\nalias_cache_ttl_secs = 60\n").unwrap();
    fs::write(dir.join("scout.test.toml"), "alias_cache_ttl_secs = 5\n[cursor]\nchunk_size = 10\n").unwrap();

    let config = Config::load_from(dir, "test").expect("load");
    let settings = config.settings().expect("settings");

    assert!(settings.soft_delete, "base file value survives");
    assert_eq!(settings.alias_cache_ttl_secs, 5, "env file wins over base file");
    assert_eq!(settings.cursor.chunk_size, 10);
    assert_eq!(settings.cursor.keep_alive, "5m", "unset nested keys keep defaults");
    assert_eq!(config.get::<usize>("cursor.chunk_size").expect("get"), 10);
}

#[test]
fn zero_chunk_size_is_rejected() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("scout.toml"), "[cursor]\nchunk_size = 0\n").unwrap();

    let err = Config::load_from(tmp.path(), "prod").err().expect("invalid config");
    assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
}

#[test]
fn record_query_dedupes_relations() {
    let mut query = RecordQuery::new(RecordType::new("Book", "books"), vec!["1".into()]);
    query.with("author").with("author").with("publisher");
    query.where_eq("published", json!(true));

    assert_eq!(query.relations, vec!["author".to_string(), "publisher".to_string()]);
    assert_eq!(query.constraints.len(), 1);
}

#[test]
fn search_metadata_is_merged_onto_record() {
    let mut attrs = Meta::new();
    attrs.insert("title".into(), json!("Dune"));
    let mut meta = Meta::new();
    meta.insert("_index".into(), json!("books"));
    meta.insert("_score".into(), json!(1.5));

    let record = Record::new("Book", "1", attrs).with_search_metadata(&meta);

    assert_eq!(record.get("title"), Some(&json!("Dune")));
    assert_eq!(record.search_metadata().get("_index"), Some(&json!("books")));
    assert_eq!(record.search_metadata().len(), 2);
}

#[test]
fn record_type_falls_back_to_default_connection() {
    let plain = RecordType::new("Book", "books");
    let remote = RecordType::new("Log", "logs").on_connection("archive");

    assert_eq!(plain.connection_or("default"), "default");
    assert_eq!(remote.connection_or("default"), "archive");
    assert_eq!(SoftDeleteMode::default(), SoftDeleteMode::ExcludeTrashed);
}

#[test]
fn bulk_operation_accessors() {
    let op = BulkOperation::Delete { index: "books".into(), key: "7".into() };
    assert_eq!(op.action(), "delete");
    assert_eq!(op.index(), "books");
    assert_eq!(op.key(), "7");
}
