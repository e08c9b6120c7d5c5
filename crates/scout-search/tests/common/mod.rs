#![allow(dead_code)]

use std::sync::Arc;

use scout_core::config::Settings;
use scout_core::types::{Record, RecordType};
use scout_memory::{MemoryDocumentStore, MemoryRecordStore};
use scout_search::SearchContext;
use serde_json::{json, Value};

pub struct Fixture {
    pub docs: Arc<MemoryDocumentStore>,
    pub records: Arc<MemoryRecordStore>,
    pub ctx: SearchContext,
}

pub fn fixture(settings: Settings) -> Fixture {
    let docs = Arc::new(MemoryDocumentStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    let ctx = SearchContext::new(settings, records.clone()).with_connection("default", docs.clone());
    Fixture { docs, records, ctx }
}

pub fn soft_delete_settings() -> Settings {
    Settings { soft_delete: true, ..Settings::default() }
}

pub fn book() -> RecordType {
    RecordType::new("Book", "books").with_soft_deletes()
}

pub fn author() -> RecordType {
    RecordType::new("Author", "authors")
}

impl Fixture {
    /// Index a book document and store the matching record.
    pub fn add_book(&self, key: &str, title: &str, trashed: bool) {
        let marker = i32::from(trashed);
        self.docs.insert("books", key, json!({ "title": title, "__soft_deleted": marker }));
        let mut attributes = json!({ "title": title });
        if trashed {
            attributes["deleted_at"] = json!("2024-05-01");
        }
        self.records.insert(record("Book", key, attributes));
    }

    pub fn add_author(&self, key: &str, name: &str) {
        self.docs.insert("authors", key, json!({ "name": name }));
        self.records.insert(record("Author", key, json!({ "name": name })));
    }
}

pub fn record(type_name: &str, key: &str, attributes: Value) -> Record {
    Record::new(type_name, key, attributes.as_object().cloned().unwrap_or_default())
}
