//! Search results and lazily hydrated hits.
//!
//! Nothing here touches the record store until a record is asked for. Hits,
//! inner hits, suggestion texts and scores are each parsed once and then
//! served from a cell.
use scout_core::error::Result;
use scout_core::types::{Meta, Record, RecordKey};
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::resolver::{hit_index, hit_key, hit_metadata, ModelResolver};

/// The parts of one raw hit the engine cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHit {
    pub collection: String,
    pub key: RecordKey,
    pub score: Option<f64>,
    pub source: Meta,
    pub highlight: BTreeMap<String, Vec<String>>,
    pub sort_values: Vec<Value>,
    pub explanation: Option<Value>,
    pub metadata: Meta,
}

impl RawHit {
    pub fn from_value(hit: &Value) -> Self {
        let highlight = hit
            .get("highlight")
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(field, fragments)| (field.clone(), strings(fragments)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            collection: hit_index(hit).unwrap_or_default().to_string(),
            key: hit_key(hit).unwrap_or_default(),
            score: hit.get("_score").and_then(Value::as_f64),
            source: hit.get("_source").and_then(Value::as_object).cloned().unwrap_or_default(),
            highlight,
            sort_values: hit.get("sort").and_then(Value::as_array).cloned().unwrap_or_default(),
            explanation: hit.get("_explanation").cloned(),
            metadata: hit_metadata(hit),
        }
    }
}

fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// One search hit with its record resolved on demand.
#[derive(Clone)]
pub struct Hit {
    raw: RawHit,
    inner: Option<Value>,
    resolver: Rc<ModelResolver>,
    record: OnceCell<Option<Rc<Record>>>,
    inner_hits: OnceCell<BTreeMap<String, Vec<Hit>>>,
}

impl Hit {
    pub fn new(hit: &Value, resolver: Rc<ModelResolver>) -> Self {
        Self {
            raw: RawHit::from_value(hit),
            inner: hit.get("inner_hits").cloned(),
            resolver,
            record: OnceCell::new(),
            inner_hits: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &RawHit {
        &self.raw
    }

    pub fn collection(&self) -> &str {
        &self.raw.collection
    }

    pub fn key(&self) -> &str {
        &self.raw.key
    }

    pub fn score(&self) -> Option<f64> {
        self.raw.score
    }

    pub fn source(&self) -> &Meta {
        &self.raw.source
    }

    pub fn highlights(&self) -> &BTreeMap<String, Vec<String>> {
        &self.raw.highlight
    }

    pub fn highlight(&self, field: &str) -> Option<&[String]> {
        self.raw.highlight.get(field).map(Vec::as_slice)
    }

    pub fn sort_values(&self) -> &[Value] {
        &self.raw.sort_values
    }

    pub fn explanation(&self) -> Option<&Value> {
        self.raw.explanation.as_ref()
    }

    pub fn metadata(&self) -> &Meta {
        &self.raw.metadata
    }

    /// The domain record behind this hit; resolved at most once.
    pub fn record(&self) -> Result<Option<Rc<Record>>> {
        if let Some(record) = self.record.get() {
            return Ok(record.clone());
        }
        let record = if self.raw.collection.is_empty() || self.raw.key.is_empty() {
            None
        } else {
            self.resolver.resolve(&self.raw.collection, &self.raw.key)?
        };
        Ok(self.record.get_or_init(|| record).clone())
    }

    /// Nested hit groups by name.
    pub fn inner_hits(&self) -> &BTreeMap<String, Vec<Hit>> {
        self.inner_hits.get_or_init(|| {
            let Some(groups) = self.inner.as_ref().and_then(Value::as_object) else {
                return BTreeMap::new();
            };
            groups
                .iter()
                .map(|(name, group)| {
                    let hits = group
                        .pointer("/hits/hits")
                        .and_then(Value::as_array)
                        .map(|hits| hits.iter().map(|h| Hit::new(h, self.resolver.clone())).collect())
                        .unwrap_or_default();
                    (name.clone(), hits)
                })
                .collect()
        })
    }

    pub fn inner_hits_for(&self, name: &str) -> &[Hit] {
        self.inner_hits().get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

impl std::fmt::Debug for Hit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hit").field("raw", &self.raw).finish_non_exhaustive()
    }
}

/// One option of a suggestion entry.
#[derive(Clone)]
pub struct SuggestOption {
    pub text: String,
    pub score: Option<f64>,
    raw: Value,
    resolver: Rc<ModelResolver>,
    record: OnceCell<Option<Rc<Record>>>,
}

impl SuggestOption {
    fn new(option: &Value, resolver: Rc<ModelResolver>) -> Self {
        Self {
            text: option.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            score: option.get("_score").or_else(|| option.get("score")).and_then(Value::as_f64),
            raw: option.clone(),
            resolver,
            record: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The record this option points at, when it carries a collection and key.
    pub fn record(&self) -> Result<Option<Rc<Record>>> {
        if let Some(record) = self.record.get() {
            return Ok(record.clone());
        }
        let record = match (hit_index(&self.raw), hit_key(&self.raw)) {
            (Some(collection), Some(key)) => self.resolver.resolve(collection, &key)?,
            _ => None,
        };
        Ok(self.record.get_or_init(|| record).clone())
    }
}

/// One entry of a named suggester's output.
#[derive(Clone)]
pub struct Suggestion {
    pub text: String,
    pub offset: u64,
    pub length: u64,
    options: Vec<SuggestOption>,
    texts: OnceCell<Vec<String>>,
    scores: OnceCell<Vec<f64>>,
}

impl Suggestion {
    fn new(entry: &Value, resolver: &Rc<ModelResolver>) -> Self {
        let options = entry
            .get("options")
            .and_then(Value::as_array)
            .map(|options| options.iter().map(|o| SuggestOption::new(o, resolver.clone())).collect())
            .unwrap_or_default();
        Self {
            text: entry.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
            offset: entry.get("offset").and_then(Value::as_u64).unwrap_or_default(),
            length: entry.get("length").and_then(Value::as_u64).unwrap_or_default(),
            options,
            texts: OnceCell::new(),
            scores: OnceCell::new(),
        }
    }

    pub fn options(&self) -> &[SuggestOption] {
        &self.options
    }

    pub fn texts(&self) -> &[String] {
        self.texts
            .get_or_init(|| self.options.iter().map(|o| o.text.clone()).collect())
    }

    /// Option scores; an option without one counts as zero.
    pub fn scores(&self) -> &[f64] {
        self.scores
            .get_or_init(|| self.options.iter().map(|o| o.score.unwrap_or(0.0)).collect())
    }

    /// Records behind every option that has one, in option order.
    pub fn records(&self) -> Result<Vec<Rc<Record>>> {
        let mut records = Vec::new();
        for option in &self.options {
            if let Some(record) = option.record()? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Outcome of one executed search.
pub struct SearchResult {
    response: Rc<Value>,
    resolver: Rc<ModelResolver>,
    hits: OnceCell<Vec<Hit>>,
    suggestions: OnceCell<BTreeMap<String, Vec<Suggestion>>>,
}

impl SearchResult {
    pub fn new(response: Rc<Value>, resolver: Rc<ModelResolver>) -> Self {
        Self { response, resolver, hits: OnceCell::new(), suggestions: OnceCell::new() }
    }

    pub fn raw(&self) -> &Value {
        &self.response
    }

    pub fn resolver(&self) -> &Rc<ModelResolver> {
        &self.resolver
    }

    pub fn hits(&self) -> &[Hit] {
        self.hits.get_or_init(|| parse_hits(&self.response, &self.resolver))
    }

    pub fn into_hits(self) -> Vec<Hit> {
        match self.hits.into_inner() {
            Some(hits) => hits,
            None => parse_hits(&self.response, &self.resolver),
        }
    }

    /// Total matching documents, `None` when the search did not track it.
    pub fn total(&self) -> Option<u64> {
        match self.response.pointer("/hits/total")? {
            Value::Number(n) => n.as_u64(),
            Value::Object(total) => total.get("value").and_then(Value::as_u64),
            _ => None,
        }
    }

    pub fn max_score(&self) -> Option<f64> {
        self.response.pointer("/hits/max_score").and_then(Value::as_f64)
    }

    pub fn took(&self) -> Option<u64> {
        self.response.get("took").and_then(Value::as_u64)
    }

    pub fn aggregations(&self) -> Option<&Meta> {
        self.response.get("aggregations").and_then(Value::as_object)
    }

    pub fn aggregation(&self, name: &str) -> Option<&Value> {
        self.aggregations().and_then(|aggs| aggs.get(name))
    }

    pub fn suggestions(&self) -> &BTreeMap<String, Vec<Suggestion>> {
        self.suggestions.get_or_init(|| {
            let Some(suggest) = self.response.get("suggest").and_then(Value::as_object) else {
                return BTreeMap::new();
            };
            suggest
                .iter()
                .map(|(name, entries)| {
                    let entries = entries
                        .as_array()
                        .map(|entries| entries.iter().map(|e| Suggestion::new(e, &self.resolver)).collect())
                        .unwrap_or_default();
                    (name.clone(), entries)
                })
                .collect()
        })
    }

    pub fn suggestion(&self, name: &str) -> &[Suggestion] {
        self.suggestions().get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Records for every hit in hit order; hits without a record are skipped.
    pub fn records(&self) -> Result<Vec<Rc<Record>>> {
        self.resolver.preload_all()?;
        let mut records = Vec::with_capacity(self.hits().len());
        for hit in self.hits() {
            if let Some(record) = hit.record()? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Source documents of every hit in hit order.
    pub fn documents(&self) -> Vec<Meta> {
        self.hits().iter().map(|hit| hit.source().clone()).collect()
    }
}

fn parse_hits(response: &Value, resolver: &Rc<ModelResolver>) -> Vec<Hit> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().map(|h| Hit::new(h, resolver.clone())).collect())
        .unwrap_or_default()
}
