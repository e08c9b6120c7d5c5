//! Final query composition and wire request assembly.
//!
//! The explicit query, the clause container and the soft-delete visibility
//! filter are merged here. The container is always the outer shape: an
//! explicit query joins a copy of it as one more `must` clause and the
//! visibility filter joins as a `filter` clause. Composition works on copies;
//! the builder's own query and container are never touched.
use scout_core::error::{Error, Result};
use scout_core::types::{SoftDeleteMode, WireRequest};
use serde_json::{json, Map, Value};

use crate::bool_query::BoolQuery;
use crate::builder::SearchBuilder;

impl SearchBuilder {
    pub fn soft_delete_mode(&self) -> SoftDeleteMode {
        self.bool_query
            .as_ref()
            .map(BoolQuery::soft_delete_mode)
            .unwrap_or_default()
    }

    /// The visibility filter for the current mode, if soft deletes are enabled.
    pub fn soft_delete_filter(&self) -> Option<Value> {
        let settings = self.ctx.settings();
        if !settings.soft_delete {
            return None;
        }
        let field = settings.soft_delete_field.as_str();
        match self.soft_delete_mode() {
            SoftDeleteMode::ExcludeTrashed => Some(json!({
                "bool": {
                    "should": [
                        { "term": { field: 0 } },
                        { "bool": { "must_not": [ { "exists": { "field": field } } ] } }
                    ],
                    "minimum_should_match": 1
                }
            })),
            SoftDeleteMode::OnlyTrashed => Some(json!({ "term": { field: 1 } })),
            SoftDeleteMode::WithTrashed => None,
        }
    }

    /// Merge explicit query, clause container and visibility filter.
    ///
    /// Returns `None` when there is nothing to send, which the engine reads as
    /// match-everything.
    pub fn build_final_query(&self) -> Result<Option<Value>> {
        let explicit = self.checked_explicit_query()?;
        let container = self.bool_query.as_ref().filter(|b| !b.is_empty());
        let visibility = self.soft_delete_filter();

        let query = match (explicit, container) {
            (Some(explicit), Some(container)) => {
                let mut merged = container.clone();
                merged.must(explicit.clone());
                if let Some(visibility) = visibility {
                    merged.filter(visibility);
                }
                Some(merged.to_value())
            }
            (None, Some(container)) => match visibility {
                Some(visibility) => {
                    let mut merged = container.clone();
                    merged.filter(visibility);
                    Some(merged.to_value())
                }
                None => Some(container.to_value()),
            },
            (explicit, None) => match visibility {
                Some(visibility) => {
                    let mut wrapper = BoolQuery::new();
                    if let Some(explicit) = explicit {
                        wrapper.must(explicit.clone());
                    }
                    wrapper.filter(visibility);
                    Some(wrapper.to_value())
                }
                None => explicit.cloned(),
            },
        };
        Ok(query)
    }

    /// Assemble the request the document store receives on `execute`.
    pub fn build_request(&self) -> Result<WireRequest> {
        let mut body = Map::new();
        if let Some(query) = self.build_final_query()? {
            body.insert("query".into(), query);
        }
        if !self.sort.is_empty() {
            body.insert("sort".into(), Value::Array(self.sort.clone()));
        }
        insert_opt(&mut body, "highlight", self.highlight.clone());
        if !self.rescore.is_empty() {
            body.insert("rescore".into(), Value::Array(self.rescore.clone()));
        }
        insert_opt(&mut body, "from", self.from.map(|v| json!(v)));
        insert_opt(&mut body, "size", self.size.map(|v| json!(v)));
        insert_map(&mut body, "suggest", &self.suggest);
        insert_opt(&mut body, "_source", self.source.clone());
        insert_opt(&mut body, "collapse", self.collapse.clone());
        insert_map(&mut body, "aggregations", &self.aggregations);
        insert_opt(&mut body, "post_filter", self.post_filter.clone());
        insert_opt(&mut body, "track_total_hits", self.track_total_hits.clone());
        insert_opt(&mut body, "track_scores", self.track_scores.map(Value::Bool));
        insert_opt(&mut body, "min_score", self.min_score.map(|v| json!(v)));
        if !self.indices_boost.is_empty() {
            body.insert("indices_boost".into(), Value::Array(self.indices_boost.clone()));
        }
        insert_opt(&mut body, "pit", self.point_in_time.clone());
        insert_opt(&mut body, "search_after", self.search_after.clone().map(Value::Array));
        insert_opt(&mut body, "explain", self.explain.map(Value::Bool));
        insert_map(&mut body, "script_fields", &self.script_fields);
        insert_map(&mut body, "runtime_mappings", &self.runtime_mappings);
        match self.knn.as_slice() {
            [] => {}
            [single] => {
                body.insert("knn".into(), single.clone());
            }
            many => {
                body.insert("knn".into(), Value::Array(many.to_vec()));
            }
        }
        if !self.stored_fields.is_empty() {
            body.insert("stored_fields".into(), json!(self.stored_fields));
        }
        if !self.docvalue_fields.is_empty() {
            body.insert("docvalue_fields".into(), Value::Array(self.docvalue_fields.clone()));
        }
        insert_opt(&mut body, "timeout", self.timeout.clone().map(Value::String));
        insert_opt(&mut body, "terminate_after", self.terminate_after.map(|v| json!(v)));
        insert_opt(&mut body, "version", self.version.map(Value::Bool));
        insert_opt(&mut body, "seq_no_primary_term", self.seq_no_primary_term.map(Value::Bool));

        let mut params = Map::new();
        insert_opt(&mut params, "search_type", self.search_type.clone().map(Value::String));
        insert_opt(&mut params, "request_cache", self.request_cache.map(Value::Bool));

        // A snapshot already pins the indices; index list, preference and
        // routing are rejected alongside it.
        let index = if self.point_in_time.is_some() {
            Vec::new()
        } else {
            insert_opt(&mut params, "preference", self.preference.clone().map(Value::String));
            if !self.routing.is_empty() {
                params.insert("routing".into(), json!(self.routing.join(",")));
            }
            self.indices()
        };

        Ok(WireRequest { index, body, params })
    }

    /// Request for delete/update-by-query; refuses to target every document.
    pub(crate) fn build_write_request(&self, operation: &'static str) -> Result<WireRequest> {
        let has_explicit = self.checked_explicit_query()?.is_some();
        let has_clauses = self.bool_query.as_ref().is_some_and(|b| !b.is_empty());
        if !has_explicit && !has_clauses {
            return Err(Error::UnfilteredWriteQuery(operation));
        }

        let mut body = Map::new();
        if let Some(query) = self.build_final_query()? {
            body.insert("query".into(), query);
        }
        let mut params = Map::new();
        if !self.routing.is_empty() {
            params.insert("routing".into(), json!(self.routing.join(",")));
        }
        Ok(WireRequest { index: self.indices(), body, params })
    }

    fn checked_explicit_query(&self) -> Result<Option<&Value>> {
        match &self.query {
            None => Ok(None),
            Some(Value::Null) => Err(Error::EmptyQuery),
            Some(Value::Object(map)) if map.is_empty() => Err(Error::EmptyQuery),
            Some(query) => Ok(Some(query)),
        }
    }
}

fn insert_opt(target: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        target.insert(key.to_string(), value);
    }
}

fn insert_map(target: &mut Map<String, Value>, key: &str, value: &Map<String, Value>) {
    if !value.is_empty() {
        target.insert(key.to_string(), Value::Object(value.clone()));
    }
}
