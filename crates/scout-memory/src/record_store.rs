//! In-process record store.
//!
//! Records are grouped by record type name. A record counts as soft-deleted
//! when its `deleted_at` attribute is set and not null. Relations are
//! declared as "records of another type whose foreign key equals my key".
use anyhow::Result;
use scout_core::traits::RecordStore;
use scout_core::types::{Record, RecordKey, RecordQuery};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub const DELETED_AT: &str = "deleted_at";

#[derive(Debug, Clone)]
struct Relation {
    related_type: String,
    foreign_key: String,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, BTreeMap<RecordKey, Record>>,
    relations: HashMap<(String, String), Relation>,
    fetches: Vec<RecordQuery>,
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<State>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Record) {
        self.state()
            .records
            .entry(record.record_type.clone())
            .or_default()
            .insert(record.key.clone(), record);
    }

    /// Declare `relation` on `record_type`: every `related_type` record whose
    /// `foreign_key` attribute equals the parent key.
    pub fn define_relation(&self, record_type: &str, relation: &str, related_type: &str, foreign_key: &str) {
        self.state().relations.insert(
            (record_type.to_string(), relation.to_string()),
            Relation { related_type: related_type.to_string(), foreign_key: foreign_key.to_string() },
        );
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetches.len()
    }

    /// Every query received, oldest first.
    pub fn fetches(&self) -> Vec<RecordQuery> {
        self.state().fetches.clone()
    }

    pub fn reset_fetches(&self) {
        self.state().fetches.clear();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn is_trashed(record: &Record) -> bool {
    record.get(DELETED_AT).is_some_and(|v| !v.is_null())
}

impl State {
    fn related(&self, parent: &Record, relation: &Relation) -> Vec<Record> {
        let Some(candidates) = self.records.get(&relation.related_type) else {
            return Vec::new();
        };
        candidates
            .values()
            .filter(|r| key_matches(r.get(&relation.foreign_key), &parent.key))
            .cloned()
            .collect()
    }
}

fn key_matches(value: Option<&Value>, key: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == key,
        Some(Value::Number(n)) => n.to_string() == key,
        _ => false,
    }
}

impl RecordStore for MemoryRecordStore {
    fn fetch_by_keys(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        let mut state = self.state();
        state.fetches.push(query.clone());
        let type_name = &query.record_type.name;
        debug!(record_type = %type_name, keys = query.keys.len(), "memory record fetch");

        let Some(by_key) = state.records.get(type_name) else {
            return Ok(Vec::new());
        };
        let include_trashed = query.with_trashed || !query.record_type.soft_deletes;
        let mut out = Vec::new();
        for key in &query.keys {
            let Some(record) = by_key.get(key) else { continue };
            if !include_trashed && is_trashed(record) {
                continue;
            }
            if !query.constraints.iter().all(|c| record.get(&c.field) == Some(&c.value)) {
                continue;
            }
            out.push(record.clone());
        }

        for record in &mut out {
            for relation_name in &query.relations {
                let relation = state
                    .relations
                    .get(&(type_name.clone(), relation_name.clone()))
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("{type_name} has no relation '{relation_name}'"))?;
                let related = state.related(record, &relation);
                record.relations.insert(relation_name.clone(), related);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::types::RecordType;
    use serde_json::json;

    fn record(type_name: &str, key: &str, attributes: Value) -> Record {
        Record::new(type_name, key, attributes.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn trashed_records_need_opt_in_on_soft_delete_types() {
        let store = MemoryRecordStore::new();
        store.insert(record("Book", "1", json!({ "title": "Dune" })));
        store.insert(record("Book", "2", json!({ "title": "Ubik", "deleted_at": "2024-01-01" })));
        let book = RecordType::new("Book", "books").with_soft_deletes();

        let mut query = RecordQuery::new(book, vec!["1".into(), "2".into()]);
        assert_eq!(store.fetch_by_keys(&query).unwrap().len(), 1);
        query.with_trashed = true;
        assert_eq!(store.fetch_by_keys(&query).unwrap().len(), 2);
        assert_eq!(store.fetch_count(), 2);
    }

    #[test]
    fn relations_are_eager_loaded() {
        let store = MemoryRecordStore::new();
        store.insert(record("Author", "a1", json!({ "name": "Herbert" })));
        store.insert(record("Book", "1", json!({ "author_id": "a1" })));
        store.insert(record("Book", "2", json!({ "author_id": "a2" })));
        store.define_relation("Author", "books", "Book", "author_id");

        let mut query = RecordQuery::new(RecordType::new("Author", "authors"), vec!["a1".into()]);
        query.with("books");
        let authors = store.fetch_by_keys(&query).unwrap();
        assert_eq!(authors[0].relations["books"].len(), 1);
        assert_eq!(authors[0].relations["books"][0].key, "1");
    }

    #[test]
    fn unknown_relation_is_an_error() {
        let store = MemoryRecordStore::new();
        store.insert(record("Book", "1", json!({})));
        let mut query = RecordQuery::new(RecordType::new("Book", "books"), vec!["1".into()]);
        query.with("reviews");
        assert!(store.fetch_by_keys(&query).is_err());
    }
}
