//! Deferred batch record resolution.
//!
//! A [`ModelResolver`] is bound to one raw search response. The first time a
//! record is asked for it walks every hit, inner hit and suggestion option
//! once, grouping record keys by collection. Each collection is then fetched
//! from the record store at most once, however many hits point into it and in
//! whatever order records are requested.
use scout_core::error::{Error, Result};
use scout_core::traits::{QueryTransform, RecordStore, ResultTransform};
use scout_core::types::{Meta, Record, RecordKey, RecordQuery, RecordType};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use crate::alias::AliasRegistry;

/// Per-collection hydration settings.
///
/// Transforms run in the order they were added.
#[derive(Clone, Default)]
pub struct CollectionOptions {
    pub relations: Vec<String>,
    pub query_transforms: Vec<Arc<dyn QueryTransform>>,
    pub result_transforms: Vec<Arc<dyn ResultTransform>>,
    pub with_trashed: bool,
}

struct Registration {
    record_type: RecordType,
    options: CollectionOptions,
}

#[derive(Default)]
struct PendingState {
    ids_collected: bool,
    pending: HashMap<String, Vec<RecordKey>>,
    metadata: HashMap<String, HashMap<RecordKey, Meta>>,
    resolved: HashMap<String, HashMap<RecordKey, Rc<Record>>>,
}

pub struct ModelResolver {
    aliases: Arc<AliasRegistry>,
    records: Arc<dyn RecordStore>,
    response: Rc<Value>,
    collections: HashMap<String, Registration>,
    state: RefCell<PendingState>,
}

impl ModelResolver {
    pub fn new(aliases: Arc<AliasRegistry>, records: Arc<dyn RecordStore>, response: Rc<Value>) -> Self {
        Self {
            aliases,
            records,
            response,
            collections: HashMap::new(),
            state: RefCell::new(PendingState::default()),
        }
    }

    pub fn register_collection(&mut self, record_type: RecordType, options: CollectionOptions) {
        self.aliases.register_index(&record_type.index);
        self.collections
            .insert(record_type.index.clone(), Registration { record_type, options });
    }

    pub fn is_registered(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    pub fn response(&self) -> &Value {
        &self.response
    }

    /// Record behind `(collection, key)`, or `None` when there is none.
    pub fn resolve(&self, collection: &str, key: &str) -> Result<Option<Rc<Record>>> {
        let name = self.aliases.resolve(collection)?;
        if !self.is_registered(&name) {
            return Ok(None);
        }
        self.collect_all_ids()?;
        self.load_models_for_index(&name)?;
        Ok(self
            .state
            .borrow()
            .resolved
            .get(&name)
            .and_then(|records| records.get(key))
            .cloned())
    }

    /// Fetch every collection that has pending keys.
    pub fn preload_all(&self) -> Result<()> {
        self.collect_all_ids()?;
        let mut names: Vec<String> = self.state.borrow().pending.keys().cloned().collect();
        names.sort();
        for name in names {
            self.load_models_for_index(&name)?;
        }
        Ok(())
    }

    fn collect_all_ids(&self) -> Result<()> {
        if self.state.borrow().ids_collected {
            return Ok(());
        }

        let mut collector = IdCollector::default();
        if let Some(hits) = self.response.pointer("/hits/hits").and_then(Value::as_array) {
            for hit in hits {
                self.collect_hit(hit, &mut collector)?;
            }
        }
        if let Some(suggest) = self.response.get("suggest").and_then(Value::as_object) {
            for entries in suggest.values().filter_map(Value::as_array) {
                for entry in entries {
                    let options = entry.get("options").and_then(Value::as_array);
                    for option in options.into_iter().flatten() {
                        self.collect_one(option, &mut collector)?;
                    }
                }
            }
        }

        let mut state = self.state.borrow_mut();
        state.ids_collected = true;
        state.pending = collector.pending;
        state.metadata = collector.metadata;
        Ok(())
    }

    fn collect_hit(&self, hit: &Value, collector: &mut IdCollector) -> Result<()> {
        self.collect_one(hit, collector)?;
        let Some(groups) = hit.get("inner_hits").and_then(Value::as_object) else {
            return Ok(());
        };
        for group in groups.values() {
            if let Some(inner) = group.pointer("/hits/hits").and_then(Value::as_array) {
                for inner_hit in inner {
                    self.collect_hit(inner_hit, collector)?;
                }
            }
        }
        Ok(())
    }

    fn collect_one(&self, hit: &Value, collector: &mut IdCollector) -> Result<()> {
        let (Some(index), Some(key)) = (hit_index(hit), hit_key(hit)) else {
            return Ok(());
        };
        let name = match collector.aliases.get(index) {
            Some(name) => name.clone(),
            None => {
                let name = self.aliases.resolve(index)?;
                collector.aliases.insert(index.to_string(), name.clone());
                name
            }
        };
        if !self.is_registered(&name) {
            return Ok(());
        }
        collector.pending.entry(name.clone()).or_default().push(key.clone());
        collector
            .metadata
            .entry(name)
            .or_default()
            .entry(key)
            .or_insert_with(|| hit_metadata(hit));
        Ok(())
    }

    fn load_models_for_index(&self, name: &str) -> Result<()> {
        let keys = {
            let state = self.state.borrow();
            if state.resolved.contains_key(name) {
                return Ok(());
            }
            let mut seen = HashSet::new();
            state
                .pending
                .get(name)
                .map(|keys| keys.iter().filter(|k| seen.insert(k.as_str())).cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        if keys.is_empty() {
            self.state.borrow_mut().resolved.insert(name.to_string(), HashMap::new());
            return Ok(());
        }
        let Some(registration) = self.collections.get(name) else {
            return Ok(());
        };

        let mut query = RecordQuery::new(registration.record_type.clone(), keys);
        query.relations = registration.options.relations.clone();
        query.with_trashed = registration.options.with_trashed && registration.record_type.soft_deletes;
        for transform in &registration.options.query_transforms {
            transform.transform_query(&mut query, &self.response);
        }

        debug!(collection = name, keys = query.keys.len(), "fetching records");
        let mut records = self.records.fetch_by_keys(&query).map_err(Error::Records)?;
        for transform in &registration.options.result_transforms {
            records = transform.transform_results(records);
        }

        let mut state = self.state.borrow_mut();
        let metadata = state.metadata.remove(name).unwrap_or_default();
        let by_key = records
            .into_iter()
            .map(|record| {
                let record = match metadata.get(&record.key) {
                    Some(meta) => record.with_search_metadata(meta),
                    None => record,
                };
                (record.key.clone(), Rc::new(record))
            })
            .collect();
        state.resolved.insert(name.to_string(), by_key);
        Ok(())
    }
}

#[derive(Default)]
struct IdCollector {
    aliases: HashMap<String, String>,
    pending: HashMap<String, Vec<RecordKey>>,
    metadata: HashMap<String, HashMap<RecordKey, Meta>>,
}

pub(crate) fn hit_index(hit: &Value) -> Option<&str> {
    hit.get("_index").and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Record key of a hit; numeric ids are accepted and stringified.
pub(crate) fn hit_key(hit: &Value) -> Option<RecordKey> {
    match hit.get("_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Every `_`-prefixed field of a hit except the source document.
pub(crate) fn hit_metadata(hit: &Value) -> Meta {
    hit.as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(k, _)| k.starts_with('_') && k.as_str() != "_source")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}
