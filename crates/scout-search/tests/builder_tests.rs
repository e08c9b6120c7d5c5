mod common;

use std::sync::Arc;

use common::{author, book, fixture, soft_delete_settings};
use scout_core::config::Settings;
use scout_core::types::RecordType;
use scout_core::Error;
use scout_memory::MemoryDocumentStore;
use scout_search::{Occur, SearchBuilder, SearchContext};
use serde_json::json;

const EXCLUDE_TRASHED: &str = r#"{"bool":{"should":[{"term":{"__soft_deleted":0}},{"bool":{"must_not":[{"exists":{"field":"__soft_deleted"}}]}}],"minimum_should_match":1}}"#;

fn exclude_trashed() -> serde_json::Value {
    serde_json::from_str(EXCLUDE_TRASHED).unwrap()
}

#[test]
fn clone_does_not_leak_changes_either_way() {
    let f = fixture(Settings::default());
    let mut original = f.ctx.search(book()).unwrap();
    original.bool_query_mut().must(json!({ "match": { "title": "dune" } }));
    original.sort_by("year", "desc").aggregate("genres", json!({ "terms": { "field": "genre" } }));
    let before = original.build_request().unwrap();

    let mut copy = original.clone();
    copy.bool_query_mut().filter(json!({ "term": { "lang": "en" } }));
    copy.sort_by("title", "asc")
        .aggregate("langs", json!({ "terms": { "field": "lang" } }))
        .highlight(json!({ "fields": { "title": {} } }))
        .size(3);
    assert_eq!(original.build_request().unwrap(), before, "clone mutation leaked into original");

    original.bool_query_mut().must_not(json!({ "term": { "draft": true } }));
    let copy_query = copy.build_request().unwrap().body["query"].clone();
    assert!(copy_query["bool"].get("must_not").is_none(), "original mutation leaked into clone");
    assert_eq!(copy.build_request().unwrap().body["sort"].as_array().unwrap().len(), 2);
}

#[test]
fn clone_keeps_its_own_filters_and_results() {
    let f = fixture(Settings::default());
    f.add_book("1", "Dune", false);
    f.add_book("2", "Emma", false);

    let mut original = f.ctx.search(book()).unwrap();
    original.bool_query_mut().filter(json!({ "exists": { "field": "title" } }));
    let mut copy = original.clone();
    copy.bool_query_mut().filter(json!({ "term": { "title": "Dune" } }));

    assert_eq!(original.bool_query().unwrap().clause_count(Occur::Filter), 1);
    assert_eq!(copy.bool_query().unwrap().clause_count(Occur::Filter), 2);

    let keys = |search: &SearchBuilder| -> Vec<String> {
        search.execute().unwrap().hits().iter().map(|h| h.key().to_string()).collect()
    };
    assert_eq!(keys(&original), vec!["1", "2"]);
    assert_eq!(keys(&copy), vec!["1"]);
    assert_eq!(keys(&original), vec!["1", "2"]);
}

#[test]
fn clones_share_the_alias_registry() {
    let f = fixture(Settings::default());
    let original = f.ctx.search(book()).unwrap();
    let mut copy = original.clone();
    copy.join(author(), None).unwrap();

    let aliases = original.connection().unwrap().aliases();
    assert!(aliases.is_registered("authors"));
    assert!(Arc::ptr_eq(aliases, copy.connection().unwrap().aliases()));
}

#[test]
fn joining_validates_types_eagerly() {
    let docs = Arc::new(MemoryDocumentStore::new());
    let f = fixture(Settings::default());
    let ctx = f.ctx.clone().with_connection("archive", docs);

    let mut search = ctx.search(book()).unwrap();
    let err = search.join(RecordType::new("Draft", "drafts").unsearchable(), None).err().unwrap();
    assert!(matches!(err, Error::NotSearchable(ref name) if name == "Draft"), "got {err:?}");

    let err = search.join(RecordType::new("Old", "old").on_connection("archive"), None).err().unwrap();
    match err {
        Error::IncompatibleConnection { base, base_connection, joined, joined_connection } => {
            assert_eq!((base.as_str(), base_connection.as_str()), ("Book", "default"));
            assert_eq!((joined.as_str(), joined_connection.as_str()), ("Old", "archive"));
        }
        other => panic!("got {other:?}"),
    }

    let err = search.join(RecordType::new("Novel", "books"), None).err().unwrap();
    match err {
        Error::AmbiguousIndex { index, existing, joined } => {
            assert_eq!(index, "books");
            assert_eq!(existing, "Book");
            assert_eq!(joined, "Novel");
        }
        other => panic!("got {other:?}"),
    }

    let err = search.with_relations("magazines", &["issues"]).err().unwrap();
    assert!(matches!(err, Error::UnjoinedCollection(_)), "got {err:?}");

    let err = ctx.search(RecordType::new("X", "x").on_connection("nowhere")).err().unwrap();
    assert!(matches!(err, Error::UnknownConnection(_)), "got {err:?}");

    search.join(book(), Some(2.0)).unwrap();
    assert_eq!(search.indices(), vec!["books"], "rejoining the same type is a no-op");
}

#[test]
fn rejoining_replaces_the_index_boost() {
    let f = fixture(Settings::default());
    let mut search = f.ctx.search(book()).unwrap();
    search.join(author(), Some(1.5)).unwrap();
    search.join(book(), Some(2.0)).unwrap();
    search.join(book(), Some(3.0)).unwrap();

    let body = search.build_request().unwrap().body;
    assert_eq!(body["indices_boost"], json!([{ "authors": 1.5 }, { "books": 3.0 }]));
}

#[test]
fn explicit_query_and_clauses_are_merged_with_visibility_filter() {
    let f = fixture(soft_delete_settings());
    let mut search = f.ctx.search(book()).unwrap();
    search.query(json!({ "match": { "title": "dune" } }));
    search.bool_query_mut().filter(json!({ "term": { "lang": "en" } }));

    let query = search.build_final_query().unwrap().unwrap();
    assert_eq!(
        query,
        json!({ "bool": {
            "must": [{ "match": { "title": "dune" } }],
            "filter": [{ "term": { "lang": "en" } }, exclude_trashed()]
        }})
    );
    assert_eq!(search.bool_query().unwrap().clause_count(scout_search::Occur::Must), 0, "builder container untouched");
}

#[test]
fn final_query_shapes_per_input() {
    let f = fixture(soft_delete_settings());
    let mut search = f.ctx.search(book()).unwrap();
    assert_eq!(
        search.build_final_query().unwrap(),
        Some(json!({ "bool": { "filter": [exclude_trashed()] } }))
    );

    search.bool_query_mut().only_trashed();
    search.query(json!({ "term": { "lang": "de" } }));
    assert_eq!(
        search.build_final_query().unwrap(),
        Some(json!({ "bool": { "must": [{ "term": { "lang": "de" } }], "filter": [{ "term": { "__soft_deleted": 1 } }] } }))
    );

    search.bool_query_mut().with_trashed();
    assert_eq!(search.build_final_query().unwrap(), Some(json!({ "term": { "lang": "de" } })));

    let plain = fixture(Settings::default());
    let search = plain.ctx.search(book()).unwrap();
    assert_eq!(search.build_final_query().unwrap(), None);
}

#[test]
fn empty_explicit_query_is_rejected_before_io() {
    let f = fixture(Settings::default());
    let mut search = f.ctx.search(book()).unwrap();
    search.query(json!({}));

    assert!(matches!(search.build_request(), Err(Error::EmptyQuery)));
    assert!(matches!(search.execute(), Err(Error::EmptyQuery)));
    assert_eq!(f.docs.calls().search, 0);
}

#[test]
fn unfiltered_write_queries_are_refused() {
    let f = fixture(soft_delete_settings());
    let mut search = f.ctx.search(book()).unwrap();
    search.bool_query_mut().with_trashed();

    assert!(matches!(search.delete_by_query(), Err(Error::UnfilteredWriteQuery("delete_by_query"))));
    assert!(matches!(
        search.update_by_query(json!({ "source": "ctx._source.x = 1" })),
        Err(Error::UnfilteredWriteQuery("update_by_query"))
    ));
    assert_eq!(f.docs.calls().delete_by_query + f.docs.calls().update_by_query, 0);
}

#[test]
fn point_in_time_replaces_index_list_and_routing() {
    let f = fixture(Settings::default());
    let mut search = f.ctx.search(book()).unwrap();
    search.preference("_local").routing(&["r1", "r2"]).search_type("dfs_query_then_fetch");

    let plain = search.build_request().unwrap();
    assert_eq!(plain.index, vec!["books"]);
    assert_eq!(plain.params["preference"], json!("_local"));
    assert_eq!(plain.params["routing"], json!("r1,r2"));

    search.point_in_time("pit-9", Some("1m"));
    let pinned = search.build_request().unwrap();
    assert!(pinned.index.is_empty());
    assert!(pinned.params.get("preference").is_none());
    assert!(pinned.params.get("routing").is_none());
    assert_eq!(pinned.params["search_type"], json!("dfs_query_then_fetch"));
    assert_eq!(pinned.body["pit"], json!({ "id": "pit-9", "keep_alive": "1m" }));
}

#[test]
fn default_facets_stay_out_of_the_body() {
    let f = fixture(Settings::default());
    let mut search = f.ctx.search(book()).unwrap();
    assert!(search.build_request().unwrap().body.is_empty());

    search
        .knn(json!({ "field": "v", "query_vector": [0.1, 0.2], "k": 3 }))
        .min_score(0.5)
        .join(author(), Some(1.5))
        .unwrap();
    let body = search.build_request().unwrap().body;
    assert_eq!(body["knn"]["k"], json!(3), "single knn clause is sent as an object");
    assert_eq!(body["min_score"], json!(0.5));
    assert_eq!(body["indices_boost"], json!([{ "authors": 1.5 }]));
}

#[test]
fn count_sends_a_sized_zero_tracked_request() {
    let f = fixture(Settings::default());
    f.add_book("1", "Dune", false);
    f.add_book("2", "Emma", false);

    let mut search = f.ctx.search(book()).unwrap();
    search.search_after(vec![json!(1)]).track_total_hits(false).size(50);
    assert_eq!(search.count().unwrap(), 2);

    let sent = f.docs.last_request().unwrap();
    assert_eq!(sent.body["size"], json!(0));
    assert_eq!(sent.body["track_total_hits"], json!(true));
    assert!(sent.body.get("search_after").is_none());
}

#[test]
fn builders_start_from_explicit_context() {
    let f = fixture(Settings::default());
    let ctx: SearchContext = f.ctx.clone();
    let search = scout_search::SearchBuilder::with_query(ctx, book(), json!({ "match_all": {} })).unwrap();
    assert_eq!(search.explicit_query(), Some(&json!({ "match_all": {} })));
    assert_eq!(search.base_type().map(|t| t.name.as_str()), Some("Book"));
}
