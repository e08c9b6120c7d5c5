//! Search request builder.
//!
//! A [`SearchBuilder`] is bound to one record type at construction and can
//! join more types living on the same connection. It accumulates every
//! request facet; `request.rs` turns them into a wire request and the
//! execution methods run it.
//!
//! Cloning a builder deep-copies every facet, so a clone can be changed
//! freely without touching the original. The alias registry is the one piece
//! of state clones share: it hangs off the [`Connection`] behind an `Arc`.
use scout_core::error::{Error, Result};
use scout_core::traits::{QueryTransform, ResultTransform};
use scout_core::types::RecordType;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::bool_query::BoolQuery;
use crate::context::{Connection, SearchContext};
use crate::resolver::CollectionOptions;

#[derive(Clone)]
pub(crate) struct JoinedCollection {
    pub(crate) record_type: RecordType,
    pub(crate) options: CollectionOptions,
}

#[derive(Clone)]
pub struct SearchBuilder {
    pub(crate) ctx: SearchContext,
    pub(crate) connection: Option<Connection>,
    pub(crate) joined: Vec<JoinedCollection>,
    pub(crate) query: Option<Value>,
    pub(crate) bool_query: Option<BoolQuery>,
    pub(crate) sort: Vec<Value>,
    pub(crate) highlight: Option<Value>,
    pub(crate) rescore: Vec<Value>,
    pub(crate) from: Option<usize>,
    pub(crate) size: Option<usize>,
    pub(crate) suggest: Map<String, Value>,
    pub(crate) source: Option<Value>,
    pub(crate) collapse: Option<Value>,
    pub(crate) aggregations: Map<String, Value>,
    pub(crate) post_filter: Option<Value>,
    pub(crate) track_total_hits: Option<Value>,
    pub(crate) track_scores: Option<bool>,
    pub(crate) min_score: Option<f64>,
    pub(crate) indices_boost: Vec<Value>,
    pub(crate) search_type: Option<String>,
    pub(crate) preference: Option<String>,
    pub(crate) point_in_time: Option<Value>,
    pub(crate) search_after: Option<Vec<Value>>,
    pub(crate) routing: Vec<String>,
    pub(crate) explain: Option<bool>,
    pub(crate) terminate_after: Option<u64>,
    pub(crate) request_cache: Option<bool>,
    pub(crate) script_fields: Map<String, Value>,
    pub(crate) runtime_mappings: Map<String, Value>,
    pub(crate) knn: Vec<Value>,
    pub(crate) stored_fields: Vec<String>,
    pub(crate) docvalue_fields: Vec<Value>,
    pub(crate) timeout: Option<String>,
    pub(crate) version: Option<bool>,
    pub(crate) seq_no_primary_term: Option<bool>,
}

impl SearchBuilder {
    pub fn new(ctx: SearchContext, record_type: RecordType) -> Result<Self> {
        let mut builder = Self {
            ctx,
            connection: None,
            joined: Vec::new(),
            query: None,
            bool_query: None,
            sort: Vec::new(),
            highlight: None,
            rescore: Vec::new(),
            from: None,
            size: None,
            suggest: Map::new(),
            source: None,
            collapse: None,
            aggregations: Map::new(),
            post_filter: None,
            track_total_hits: None,
            track_scores: None,
            min_score: None,
            indices_boost: Vec::new(),
            search_type: None,
            preference: None,
            point_in_time: None,
            search_after: None,
            routing: Vec::new(),
            explain: None,
            terminate_after: None,
            request_cache: None,
            script_fields: Map::new(),
            runtime_mappings: Map::new(),
            knn: Vec::new(),
            stored_fields: Vec::new(),
            docvalue_fields: Vec::new(),
            timeout: None,
            version: None,
            seq_no_primary_term: None,
        };
        builder.join(record_type, None)?;
        Ok(builder)
    }

    pub fn with_query(ctx: SearchContext, record_type: RecordType, query: Value) -> Result<Self> {
        let mut builder = Self::new(ctx, record_type)?;
        builder.query = Some(query);
        Ok(builder)
    }

    /// Add `record_type` to the searched collections.
    ///
    /// The first join fixes the connection and the base type. Later joins must
    /// use the same connection, and an index may only be claimed by one type.
    pub fn join(&mut self, record_type: RecordType, boost: Option<f64>) -> Result<&mut Self> {
        if !record_type.searchable {
            return Err(Error::NotSearchable(record_type.name));
        }
        let connection_name = record_type
            .connection_or(&self.ctx.settings().default_connection)
            .to_string();

        let fixed_connection = self.connection.as_ref().map(|c| c.name().to_string());
        match fixed_connection {
            Some(base_connection) if base_connection != connection_name => {
                let base = self.base_type().map(|t| t.name.clone()).unwrap_or_default();
                return Err(Error::IncompatibleConnection {
                    base,
                    base_connection,
                    joined: record_type.name,
                    joined_connection: connection_name,
                });
            }
            Some(_) => {}
            None => {
                self.connection = Some(self.ctx.connection(&connection_name)?.clone());
            }
        }

        let claimed_by = self
            .joined
            .iter()
            .find(|j| j.record_type.index == record_type.index)
            .map(|j| j.record_type.name.clone());
        match claimed_by {
            Some(existing) if existing != record_type.name => {
                return Err(Error::AmbiguousIndex {
                    index: record_type.index,
                    existing,
                    joined: record_type.name,
                });
            }
            Some(_) => {}
            None => {
                if let Some(connection) = &self.connection {
                    connection.aliases().register_index(&record_type.index);
                }
                self.joined.push(JoinedCollection {
                    record_type: record_type.clone(),
                    options: CollectionOptions::default(),
                });
            }
        }

        if let Some(boost) = boost {
            let entry = json!({ record_type.index.clone(): boost });
            match self.indices_boost.iter_mut().find(|b| b.get(record_type.index.as_str()).is_some()) {
                Some(existing) => *existing = entry,
                None => self.indices_boost.push(entry),
            }
        }
        Ok(self)
    }

    pub fn query(&mut self, query: Value) -> &mut Self {
        self.query = Some(query);
        self
    }

    /// The clause container, created on first use.
    pub fn bool_query_mut(&mut self) -> &mut BoolQuery {
        self.bool_query.get_or_insert_with(BoolQuery::new)
    }

    pub fn set_bool_query(&mut self, bool_query: BoolQuery) -> &mut Self {
        self.bool_query = Some(bool_query);
        self
    }

    pub fn sort(&mut self, sort: Value) -> &mut Self {
        self.sort.push(sort);
        self
    }

    pub fn sort_by(&mut self, field: &str, order: &str) -> &mut Self {
        self.sort(json!({ field: { "order": order } }))
    }

    pub fn highlight(&mut self, highlight: Value) -> &mut Self {
        self.highlight = Some(highlight);
        self
    }

    pub fn rescore(&mut self, rescore: Value) -> &mut Self {
        self.rescore.push(rescore);
        self
    }

    pub fn from(&mut self, from: usize) -> &mut Self {
        self.from = Some(from);
        self
    }

    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = Some(size);
        self
    }

    pub fn suggest(&mut self, name: &str, suggester: Value) -> &mut Self {
        self.suggest.insert(name.to_string(), suggester);
        self
    }

    pub fn source(&mut self, source: Value) -> &mut Self {
        self.source = Some(source);
        self
    }

    pub fn collapse(&mut self, collapse: Value) -> &mut Self {
        self.collapse = Some(collapse);
        self
    }

    pub fn aggregate(&mut self, name: &str, aggregation: Value) -> &mut Self {
        self.aggregations.insert(name.to_string(), aggregation);
        self
    }

    pub fn post_filter(&mut self, filter: Value) -> &mut Self {
        self.post_filter = Some(filter);
        self
    }

    /// `true`, `false`, or an integer upper bound.
    pub fn track_total_hits(&mut self, track: impl Into<Value>) -> &mut Self {
        self.track_total_hits = Some(track.into());
        self
    }

    pub fn track_scores(&mut self, track: bool) -> &mut Self {
        self.track_scores = Some(track);
        self
    }

    pub fn min_score(&mut self, min_score: f64) -> &mut Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn search_type(&mut self, search_type: &str) -> &mut Self {
        self.search_type = Some(search_type.to_string());
        self
    }

    pub fn preference(&mut self, preference: &str) -> &mut Self {
        self.preference = Some(preference.to_string());
        self
    }

    pub fn point_in_time(&mut self, id: &str, keep_alive: Option<&str>) -> &mut Self {
        let mut pit = Map::new();
        pit.insert("id".to_string(), json!(id));
        if let Some(keep_alive) = keep_alive {
            pit.insert("keep_alive".to_string(), json!(keep_alive));
        }
        self.point_in_time = Some(Value::Object(pit));
        self
    }

    pub fn search_after(&mut self, values: Vec<Value>) -> &mut Self {
        self.search_after = Some(values);
        self
    }

    pub fn routing(&mut self, routing: &[&str]) -> &mut Self {
        self.routing = routing.iter().map(|r| (*r).to_string()).collect();
        self
    }

    pub fn explain(&mut self, explain: bool) -> &mut Self {
        self.explain = Some(explain);
        self
    }

    pub fn terminate_after(&mut self, count: u64) -> &mut Self {
        self.terminate_after = Some(count);
        self
    }

    pub fn request_cache(&mut self, enabled: bool) -> &mut Self {
        self.request_cache = Some(enabled);
        self
    }

    pub fn script_field(&mut self, name: &str, script: Value) -> &mut Self {
        self.script_fields.insert(name.to_string(), script);
        self
    }

    pub fn runtime_mapping(&mut self, name: &str, mapping: Value) -> &mut Self {
        self.runtime_mappings.insert(name.to_string(), mapping);
        self
    }

    /// Add an approximate nearest-neighbour clause.
    pub fn knn(&mut self, knn: Value) -> &mut Self {
        self.knn.push(knn);
        self
    }

    pub fn stored_fields(&mut self, fields: &[&str]) -> &mut Self {
        self.stored_fields = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    pub fn docvalue_field(&mut self, field: Value) -> &mut Self {
        self.docvalue_fields.push(field);
        self
    }

    pub fn timeout(&mut self, timeout: &str) -> &mut Self {
        self.timeout = Some(timeout.to_string());
        self
    }

    pub fn version(&mut self, version: bool) -> &mut Self {
        self.version = Some(version);
        self
    }

    pub fn seq_no_primary_term(&mut self, enabled: bool) -> &mut Self {
        self.seq_no_primary_term = Some(enabled);
        self
    }

    pub fn with_relations(&mut self, index: &str, relations: &[&str]) -> Result<&mut Self> {
        let options = self.options_mut(index)?;
        for relation in relations {
            if !options.relations.iter().any(|r| r == relation) {
                options.relations.push((*relation).to_string());
            }
        }
        Ok(self)
    }

    pub fn transform_query(&mut self, index: &str, transform: Arc<dyn QueryTransform>) -> Result<&mut Self> {
        self.options_mut(index)?.query_transforms.push(transform);
        Ok(self)
    }

    pub fn transform_results(&mut self, index: &str, transform: Arc<dyn ResultTransform>) -> Result<&mut Self> {
        self.options_mut(index)?.result_transforms.push(transform);
        Ok(self)
    }

    /// Let the record store return soft-deleted records for `index`.
    pub fn with_trashed_records(&mut self, index: &str) -> Result<&mut Self> {
        self.options_mut(index)?.with_trashed = true;
        Ok(self)
    }

    pub fn explicit_query(&self) -> Option<&Value> {
        self.query.as_ref()
    }

    pub fn bool_query(&self) -> Option<&BoolQuery> {
        self.bool_query.as_ref()
    }

    pub fn base_type(&self) -> Option<&RecordType> {
        self.joined.first().map(|j| &j.record_type)
    }

    /// Logical collection names in join order.
    pub fn indices(&self) -> Vec<String> {
        self.joined.iter().map(|j| j.record_type.index.clone()).collect()
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("search has no joined collection".to_string()))
    }

    pub fn context(&self) -> &SearchContext {
        &self.ctx
    }

    fn options_mut(&mut self, index: &str) -> Result<&mut CollectionOptions> {
        self.joined
            .iter_mut()
            .find(|j| j.record_type.index == index)
            .map(|j| &mut j.options)
            .ok_or_else(|| Error::UnjoinedCollection(index.to_string()))
    }
}
