mod common;

use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{author, book, record};
use scout_core::types::{Record, RecordQuery};
use scout_memory::{MemoryDocumentStore, MemoryRecordStore};
use scout_search::{AliasRegistry, CollectionOptions, ModelResolver};
use serde_json::{json, Value};

struct Setup {
    docs: Arc<MemoryDocumentStore>,
    records: Arc<MemoryRecordStore>,
}

fn setup() -> Setup {
    let docs = Arc::new(MemoryDocumentStore::new());
    docs.put_alias("books_v2", "books");
    docs.create_index("authors");
    let records = Arc::new(MemoryRecordStore::new());
    for key in ["1", "2", "3"] {
        records.insert(record("Book", key, json!({ "title": format!("book {key}") })));
    }
    records.insert(record("Author", "a1", json!({ "name": "Herbert" })));
    Setup { docs, records }
}

fn resolver(setup: &Setup, response: Value) -> ModelResolver {
    let aliases = Arc::new(AliasRegistry::new(setup.docs.clone(), Duration::from_secs(60)));
    ModelResolver::new(aliases, setup.records.clone(), Rc::new(response))
}

fn hit(index: &str, id: &str) -> Value {
    json!({ "_index": index, "_id": id, "_score": 1.5, "_source": { "x": 1 } })
}

#[test]
fn one_fetch_per_collection_regardless_of_access_order() {
    let s = setup();
    let response = json!({ "hits": { "hits": [
        hit("books", "1"),
        hit("authors", "a1"),
        hit("books", "2"),
        {
            "_index": "books", "_id": "3",
            "inner_hits": { "same_series": { "hits": { "hits": [ hit("books", "1"), hit("books", "2") ] } } }
        }
    ]}});
    let mut resolver = resolver(&s, response);
    resolver.register_collection(book(), CollectionOptions::default());
    resolver.register_collection(author(), CollectionOptions::default());

    for (collection, key) in [("books", "2"), ("authors", "a1"), ("books", "1"), ("books", "3"), ("books", "2")] {
        assert!(resolver.resolve(collection, key).unwrap().is_some(), "{collection}/{key}");
    }

    let fetches = s.records.fetches();
    assert_eq!(fetches.len(), 2);
    let book_fetch = fetches.iter().find(|q| q.record_type.name == "Book").unwrap();
    assert_eq!(book_fetch.keys, vec!["1", "2", "3"], "keys are deduplicated in first-seen order");
}

#[test]
fn unregistered_collection_resolves_to_none_without_io() {
    let s = setup();
    let mut resolver = resolver(&s, json!({ "hits": { "hits": [hit("books", "1")] } }));
    resolver.register_collection(book(), CollectionOptions::default());

    assert!(resolver.resolve("authors", "a1").unwrap().is_none());
    assert_eq!(s.records.fetch_count(), 0);
}

#[test]
fn physical_index_names_map_back_to_registered_collections() {
    let s = setup();
    let response = json!({ "hits": { "hits": [hit("books_v2", "1"), hit("books_v2", "2")] } });
    let mut resolver = resolver(&s, response);
    resolver.register_collection(book(), CollectionOptions::default());

    let record = resolver.resolve("books_v2", "1").unwrap().unwrap();
    assert_eq!(record.key, "1");
    assert!(resolver.resolve("books", "2").unwrap().is_some());
    assert_eq!(s.docs.calls().lookup_aliases, 1, "one batched alias lookup");
    assert_eq!(s.records.fetch_count(), 1);
}

#[test]
fn hit_metadata_is_attached_without_source() {
    let s = setup();
    let mut resolver = resolver(&s, json!({ "hits": { "hits": [hit("books", "1")] } }));
    resolver.register_collection(book(), CollectionOptions::default());

    let record = resolver.resolve("books", "1").unwrap().unwrap();
    let meta = record.search_metadata();
    assert_eq!(meta.get("_index"), Some(&json!("books")));
    assert_eq!(meta.get("_id"), Some(&json!("1")));
    assert_eq!(meta.get("_score"), Some(&json!(1.5)));
    assert!(meta.get("_source").is_none());
}

#[test]
fn transforms_run_in_registration_order() {
    let s = setup();
    let response = json!({ "hits": { "hits": [hit("books", "1"), hit("books", "2")] }, "took": 7 });
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut options = CollectionOptions { relations: vec!["series".into()], ..CollectionOptions::default() };
    let first = seen.clone();
    options.query_transforms.push(Arc::new(move |query: &mut RecordQuery, raw: &Value| {
        first.lock().unwrap().push(format!("q1 took={}", raw["took"]));
        query.relations.clear();
    }));
    let second = seen.clone();
    options.query_transforms.push(Arc::new(move |query: &mut RecordQuery, _: &Value| {
        second.lock().unwrap().push(format!("q2 relations={}", query.relations.len()));
    }));
    options.result_transforms.push(Arc::new(|records: Vec<Record>| {
        records.into_iter().filter(|r| r.key != "2").collect::<Vec<_>>()
    }));

    let mut resolver = resolver(&s, response);
    resolver.register_collection(book(), options);

    assert!(resolver.resolve("books", "1").unwrap().is_some());
    assert!(resolver.resolve("books", "2").unwrap().is_none(), "filtered by the result transform");
    assert_eq!(*seen.lock().unwrap(), vec!["q1 took=7", "q2 relations=0"]);
}

#[test]
fn trashed_records_only_for_soft_delete_types() {
    let s = setup();
    let mut resolver = resolver(&s, json!({ "hits": { "hits": [hit("books", "1"), hit("authors", "a1")] } }));
    let trashed = CollectionOptions { with_trashed: true, ..CollectionOptions::default() };
    resolver.register_collection(book(), trashed.clone());
    resolver.register_collection(author(), trashed);
    resolver.preload_all().unwrap();

    for query in s.records.fetches() {
        let expected = query.record_type.name == "Book";
        assert_eq!(query.with_trashed, expected, "{}", query.record_type.name);
    }
    assert_eq!(s.records.fetch_count(), 2);
    resolver.preload_all().unwrap();
    assert_eq!(s.records.fetch_count(), 2, "preloading twice fetches nothing new");
}

#[test]
fn suggestion_options_are_collected_too() {
    let s = setup();
    let response = json!({
        "hits": { "hits": [] },
        "suggest": { "titles": [ { "text": "bo", "offset": 0, "length": 2, "options": [
            { "text": "book 3", "_index": "books", "_id": "3", "_score": 2.0 }
        ] } ] }
    });
    let mut resolver = resolver(&s, response);
    resolver.register_collection(book(), CollectionOptions::default());

    assert!(resolver.resolve("books", "3").unwrap().is_some());
    assert_eq!(s.records.fetches()[0].keys, vec!["3"]);
}
