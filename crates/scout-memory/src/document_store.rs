//! In-process document store.
//!
//! Holds physical indices with aliases, evaluates searches with
//! [`crate::query`], and keeps point-in-time snapshots as frozen copies of
//! the documents they cover. Every round trip is counted so callers can
//! assert how much I/O an operation cost.
use anyhow::{anyhow, bail};
use scout_core::error::StoreError;
use scout_core::traits::DocumentStore;
use scout_core::types::{AliasLookup, BulkOperation, Meta, RecordKey, WireRequest};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::query::{self, DocRef, SortKey};

const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct StoredDoc {
    seq: u64,
    source: Meta,
}

#[derive(Debug, Default)]
struct IndexData {
    docs: BTreeMap<RecordKey, StoredDoc>,
    aliases: Vec<String>,
    write_blocked: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    index: String,
    id: RecordKey,
    doc: StoredDoc,
}

/// Round trips made against the store, by endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub search: usize,
    pub bulk: usize,
    pub open_snapshot: usize,
    pub close_snapshot: usize,
    pub lookup_aliases: usize,
    pub delete_by_query: usize,
    pub update_by_query: usize,
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, IndexData>,
    snapshots: HashMap<String, Vec<Candidate>>,
    next_seq: u64,
    next_snapshot: u64,
    calls: CallCounts,
    requests: Vec<WireRequest>,
    fail_next_search: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<State>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_index(&self, index: &str) {
        self.state().indices.entry(index.to_string()).or_default();
    }

    /// Point `alias` at `index`, creating the index when missing.
    pub fn put_alias(&self, index: &str, alias: &str) {
        let mut state = self.state();
        let data = state.indices.entry(index.to_string()).or_default();
        if !data.aliases.iter().any(|a| a == alias) {
            data.aliases.push(alias.to_string());
        }
    }

    pub fn remove_alias(&self, index: &str, alias: &str) {
        if let Some(data) = self.state().indices.get_mut(index) {
            data.aliases.retain(|a| a != alias);
        }
    }

    /// Insert or replace one document; `index` may be an alias.
    pub fn insert(&self, index: &str, id: &str, source: Value) {
        let mut state = self.state();
        let physical = state.physical_for_write(index);
        let seq = state.bump_seq();
        let source = source.as_object().cloned().unwrap_or_default();
        state
            .indices
            .entry(physical)
            .or_default()
            .docs
            .insert(id.to_string(), StoredDoc { seq, source });
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Meta> {
        let state = self.state();
        let physical = state.physical_for_write(index);
        state.indices.get(&physical)?.docs.get(id).map(|d| d.source.clone())
    }

    pub fn doc_count(&self, index: &str) -> usize {
        let state = self.state();
        state
            .resolve_names(&[index.to_string()])
            .map(|names| names.iter().filter_map(|n| state.indices.get(n)).map(|d| d.docs.len()).sum())
            .unwrap_or(0)
    }

    /// Make bulk writes into `index` fail per item.
    pub fn block_writes(&self, index: &str) {
        self.state().indices.entry(index.to_string()).or_default().write_blocked = true;
    }

    /// The next `search` call fails with `message`.
    pub fn fail_next_search(&self, message: &str) {
        self.state().fail_next_search = Some(message.to_string());
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn open_snapshots(&self) -> usize {
        self.state().snapshots.len()
    }

    /// Every search request received, oldest first.
    pub fn requests(&self) -> Vec<WireRequest> {
        self.state().requests.clone()
    }

    pub fn last_request(&self) -> Option<WireRequest> {
        self.state().requests.last().cloned()
    }

    pub fn reset_calls(&self) {
        let mut state = self.state();
        state.calls = CallCounts::default();
        state.requests.clear();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Physical index names behind `names`; unknown names are an error.
    fn resolve_names(&self, names: &[String]) -> Result<Vec<String>, StoreError> {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let mut found = false;
            for (index, data) in &self.indices {
                if index == name || data.aliases.contains(name) {
                    found = true;
                    if !out.contains(index) {
                        out.push(index.clone());
                    }
                }
            }
            if !found {
                return Err(StoreError::NotFound(format!("no such index [{name}]")));
            }
        }
        Ok(out)
    }

    /// Write target for `name`: the first index it aliases, or itself.
    fn physical_for_write(&self, name: &str) -> String {
        if self.indices.contains_key(name) {
            return name.to_string();
        }
        self.indices
            .iter()
            .find(|(_, data)| data.aliases.iter().any(|a| a == name))
            .map_or_else(|| name.to_string(), |(index, _)| index.clone())
    }

    fn candidates(&self, names: &[String]) -> Result<Vec<Candidate>, StoreError> {
        let physical = self.resolve_names(names)?;
        Ok(physical
            .iter()
            .filter_map(|index| self.indices.get(index).map(|data| (index, data)))
            .flat_map(|(index, data)| {
                data.docs.iter().map(move |(id, doc)| Candidate {
                    index: index.clone(),
                    id: id.clone(),
                    doc: doc.clone(),
                })
            })
            .collect())
    }
}

fn matching(request: &WireRequest, candidates: Vec<Candidate>) -> anyhow::Result<Vec<Candidate>> {
    let query = request.body.get("query");
    let mut out = Vec::new();
    for candidate in candidates {
        let keep = match query {
            None => true,
            Some(q) => query::matches(q, &doc_ref(&candidate))?,
        };
        if keep {
            out.push(candidate);
        }
    }
    Ok(out)
}

fn doc_ref(candidate: &Candidate) -> DocRef<'_> {
    DocRef { id: &candidate.id, seq: candidate.doc.seq, source: &candidate.doc.source }
}

fn other(error: anyhow::Error) -> StoreError {
    StoreError::Other(error)
}

fn usize_param(body: &Meta, key: &str, default: usize) -> usize {
    body.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

fn filter_source(source: &Meta, filter: Option<&Value>) -> Option<Value> {
    match filter {
        None | Some(Value::Bool(true)) => Some(Value::Object(source.clone())),
        Some(Value::Bool(false)) => None,
        Some(Value::Array(fields)) => {
            let fields: Vec<&str> = fields.iter().filter_map(Value::as_str).collect();
            let kept: Meta = source
                .iter()
                .filter(|(k, _)| fields.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Some(Value::Object(kept))
        }
        Some(_) => Some(Value::Object(source.clone())),
    }
}

fn completion_options(suggest: &Meta, docs: &[Candidate]) -> anyhow::Result<Meta> {
    let mut out = Meta::new();
    for (name, spec) in suggest {
        let prefix = spec.get("prefix").and_then(Value::as_str).unwrap_or_default();
        let completion = spec
            .get("completion")
            .ok_or_else(|| anyhow!("suggester '{name}' is not a completion suggester"))?;
        let field = completion
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("completion suggester '{name}' needs a field"))?;
        let size = usize_param(completion.as_object().unwrap_or(&Meta::new()), "size", 5);

        let wanted = prefix.to_lowercase();
        let options: Vec<Value> = docs
            .iter()
            .filter_map(|c| {
                let text = query::field_values(&doc_ref(c), field).first()?.as_str()?.to_string();
                text.to_lowercase().starts_with(&wanted).then(|| {
                    json!({
                        "text": text,
                        "_index": c.index,
                        "_id": c.id,
                        "_score": 1.0,
                        "_source": c.doc.source,
                    })
                })
            })
            .take(size)
            .collect();
        out.insert(
            name.clone(),
            json!([{ "text": prefix, "offset": 0, "length": prefix.chars().count(), "options": options }]),
        );
    }
    Ok(out)
}

fn run_search(state: &State, request: &WireRequest) -> Result<Value, StoreError> {
    let body = &request.body;
    let (candidates, pit_id) = match body.get("pit") {
        Some(pit) => {
            if !request.index.is_empty() {
                return Err(other(anyhow!("an index list may not be combined with a point in time")));
            }
            let id = pit
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| other(anyhow!("pit needs an id")))?;
            let docs = state
                .snapshots
                .get(id)
                .ok_or_else(|| StoreError::NotFound(format!("no such point in time [{id}]")))?;
            (docs.clone(), Some(id.to_string()))
        }
        None => (state.candidates(&request.index)?, None),
    };

    let matched = matching(request, candidates.clone()).map_err(other)?;
    let total = matched.len();

    let sort_spec: Vec<Value> = body.get("sort").and_then(Value::as_array).cloned().unwrap_or_default();
    let keys: Vec<SortKey> = query::parse_sort(&sort_spec).map_err(other)?;
    let mut ranked: Vec<(Candidate, Vec<Value>)> = matched
        .iter()
        .map(|c| {
            let values = query::sort_values(&keys, &doc_ref(c), 1.0);
            (c.clone(), values)
        })
        .collect();
    if keys.is_empty() {
        ranked.sort_by_key(|(c, _)| c.doc.seq);
    } else {
        ranked.sort_by(|a, b| query::compare_sort_values(&keys, &a.1, &b.1));
    }
    if let Some(after) = body.get("search_after").and_then(Value::as_array) {
        ranked.retain(|(_, values)| query::compare_sort_values(&keys, values, after) == Ordering::Greater);
    }

    let from = usize_param(body, "from", 0);
    let size = usize_param(body, "size", DEFAULT_SIZE);
    let hits: Vec<Value> = ranked
        .iter()
        .skip(from)
        .take(size)
        .map(|(c, values)| {
            let mut hit = Meta::new();
            hit.insert("_index".into(), json!(c.index));
            hit.insert("_id".into(), json!(c.id));
            hit.insert("_score".into(), json!(1.0));
            if let Some(source) = filter_source(&c.doc.source, body.get("_source")) {
                hit.insert("_source".into(), source);
            }
            if !keys.is_empty() {
                hit.insert("sort".into(), Value::Array(values.clone()));
            }
            Value::Object(hit)
        })
        .collect();

    let mut hits_section = Meta::new();
    match body.get("track_total_hits") {
        Some(Value::Bool(false)) => {}
        Some(Value::Number(limit)) => {
            let limit = limit.as_u64().unwrap_or(u64::MAX);
            let total = total as u64;
            let (value, relation) = if total > limit { (limit, "gte") } else { (total, "eq") };
            hits_section.insert("total".into(), json!({ "value": value, "relation": relation }));
        }
        _ => {
            hits_section.insert("total".into(), json!({ "value": total, "relation": "eq" }));
        }
    }
    hits_section.insert("max_score".into(), if hits.is_empty() { Value::Null } else { json!(1.0) });
    hits_section.insert("hits".into(), Value::Array(hits));

    let mut response = Meta::new();
    response.insert("took".into(), json!(0));
    response.insert("timed_out".into(), json!(false));
    response.insert("hits".into(), Value::Object(hits_section));
    if let Some(id) = pit_id {
        response.insert("pit_id".into(), json!(id));
    }
    let aggregations = body.get("aggregations").or_else(|| body.get("aggs")).and_then(Value::as_object);
    if let Some(aggregations) = aggregations {
        let docs: Vec<DocRef<'_>> = matched.iter().map(doc_ref).collect();
        let aggregated = query::aggregate(aggregations, &docs).map_err(other)?;
        response.insert("aggregations".into(), Value::Object(aggregated));
    }
    if let Some(suggest) = body.get("suggest").and_then(Value::as_object) {
        let options = completion_options(suggest, &candidates).map_err(other)?;
        response.insert("suggest".into(), Value::Object(options));
    }
    Ok(Value::Object(response))
}

/// Apply `ctx._source.<field> = <value>` statements from a script.
fn apply_script(script: &Value, source: &mut Meta) -> anyhow::Result<()> {
    let text = script
        .get("source")
        .and_then(Value::as_str)
        .or_else(|| script.as_str())
        .ok_or_else(|| anyhow!("script needs a source"))?;
    let params = script.get("params").and_then(Value::as_object);
    for statement in text.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((target, value)) = statement.split_once('=') else {
            bail!("unsupported script statement '{statement}'");
        };
        let field = target
            .trim()
            .strip_prefix("ctx._source.")
            .ok_or_else(|| anyhow!("script may only assign ctx._source fields"))?;
        let value = value.trim();
        let value = match value.strip_prefix("params.") {
            Some(name) => params
                .and_then(|p| p.get(name))
                .cloned()
                .ok_or_else(|| anyhow!("missing script param '{name}'"))?,
            None => serde_json::from_str(value).map_err(|e| anyhow!("bad script literal '{value}': {e}"))?,
        };
        source.insert(field.to_string(), value);
    }
    Ok(())
}

impl DocumentStore for MemoryDocumentStore {
    fn search(&self, request: &WireRequest) -> Result<Value, StoreError> {
        let mut state = self.state();
        state.calls.search += 1;
        state.requests.push(request.clone());
        if let Some(message) = state.fail_next_search.take() {
            return Err(other(anyhow!(message)));
        }
        debug!(indices = ?request.index, "memory search");
        run_search(&state, request)
    }

    fn bulk_write(&self, operations: &[BulkOperation]) -> Result<Value, StoreError> {
        let mut state = self.state();
        state.calls.bulk += 1;
        let mut errors = false;
        let mut items = Vec::with_capacity(operations.len());
        for operation in operations {
            let physical = state.physical_for_write(operation.index());
            let blocked = state.indices.get(&physical).is_some_and(|d| d.write_blocked);
            let mut outcome = json!({ "_index": physical, "_id": operation.key() });
            if blocked {
                errors = true;
                outcome["status"] = json!(403);
                outcome["error"] = json!({
                    "type": "cluster_block_exception",
                    "reason": format!("index [{physical}] blocked"),
                });
            } else {
                match operation {
                    BulkOperation::Index { key, document, .. } => {
                        let seq = state.bump_seq();
                        let data = state.indices.entry(physical.clone()).or_default();
                        let created = data
                            .docs
                            .insert(key.clone(), StoredDoc { seq, source: document.clone() })
                            .is_none();
                        outcome["status"] = json!(if created { 201 } else { 200 });
                        outcome["result"] = json!(if created { "created" } else { "updated" });
                    }
                    BulkOperation::Delete { key, .. } => {
                        let removed = state
                            .indices
                            .get_mut(&physical)
                            .and_then(|d| d.docs.remove(key))
                            .is_some();
                        outcome["status"] = json!(if removed { 200 } else { 404 });
                        outcome["result"] = json!(if removed { "deleted" } else { "not_found" });
                    }
                }
            }
            let mut item = Meta::new();
            item.insert(operation.action().to_string(), outcome);
            items.push(Value::Object(item));
        }
        Ok(json!({ "took": 0, "errors": errors, "items": items }))
    }

    fn open_snapshot(&self, indices: &[String], keep_alive: &str) -> Result<String, StoreError> {
        let mut state = self.state();
        state.calls.open_snapshot += 1;
        let docs = state.candidates(indices)?;
        state.next_snapshot += 1;
        let id = format!("pit-{}", state.next_snapshot);
        debug!(%id, %keep_alive, docs = docs.len(), "memory snapshot opened");
        state.snapshots.insert(id.clone(), docs);
        Ok(id)
    }

    fn close_snapshot(&self, snapshot_id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.close_snapshot += 1;
        state
            .snapshots
            .remove(snapshot_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("no such point in time [{snapshot_id}]")))
    }

    fn lookup_aliases(&self, names: &[String]) -> Result<AliasLookup, StoreError> {
        let mut state = self.state();
        state.calls.lookup_aliases += 1;
        let lookup: AliasLookup = state
            .indices
            .iter()
            .filter(|(index, data)| names.iter().any(|n| *n == **index || data.aliases.contains(n)))
            .map(|(index, data)| (index.clone(), data.aliases.clone()))
            .collect();
        if lookup.is_empty() {
            return Err(StoreError::NotFound(format!("no index or alias matches {names:?}")));
        }
        Ok(lookup)
    }

    fn delete_by_query(&self, request: &WireRequest) -> Result<Value, StoreError> {
        let mut state = self.state();
        state.calls.delete_by_query += 1;
        let matched = matching(request, state.candidates(&request.index)?).map_err(other)?;
        for candidate in &matched {
            if let Some(data) = state.indices.get_mut(&candidate.index) {
                data.docs.remove(&candidate.id);
            }
        }
        Ok(json!({ "deleted": matched.len(), "total": matched.len(), "failures": [] }))
    }

    fn update_by_query(&self, request: &WireRequest) -> Result<Value, StoreError> {
        let mut state = self.state();
        state.calls.update_by_query += 1;
        let matched = matching(request, state.candidates(&request.index)?).map_err(other)?;
        let script = request.body.get("script").cloned();
        for candidate in &matched {
            let seq = state.bump_seq();
            let Some(stored) = state.indices.get_mut(&candidate.index).and_then(|d| d.docs.get_mut(&candidate.id)) else {
                continue;
            };
            if let Some(script) = &script {
                apply_script(script, &mut stored.source).map_err(other)?;
            }
            stored.seq = seq;
        }
        Ok(json!({ "updated": matched.len(), "total": matched.len(), "failures": [] }))
    }
}
