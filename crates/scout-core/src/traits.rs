use serde_json::Value;

use crate::error::StoreError;
use crate::types::{AliasLookup, BulkOperation, Record, RecordQuery, WireRequest};

/// Transport to a document-search engine; every call is one round trip.
pub trait DocumentStore: Send + Sync {
    fn search(&self, request: &WireRequest) -> Result<Value, StoreError>;
    fn bulk_write(&self, operations: &[BulkOperation]) -> Result<Value, StoreError>;
    fn open_snapshot(&self, indices: &[String], keep_alive: &str) -> Result<String, StoreError>;
    fn close_snapshot(&self, snapshot_id: &str) -> Result<(), StoreError>;
    /// Must answer `StoreError::NotFound` when none of `names` exist.
    fn lookup_aliases(&self, names: &[String]) -> Result<AliasLookup, StoreError>;
    fn delete_by_query(&self, request: &WireRequest) -> Result<Value, StoreError>;
    fn update_by_query(&self, request: &WireRequest) -> Result<Value, StoreError>;
}

/// Persistence layer that hydrates records by key.
pub trait RecordStore: Send + Sync {
    fn fetch_by_keys(&self, query: &RecordQuery) -> anyhow::Result<Vec<Record>>;
}

/// Adjusts the record query for one collection before it runs.
pub trait QueryTransform: Send + Sync {
    fn transform_query(&self, query: &mut RecordQuery, raw_response: &Value);
}

/// Post-processes the records fetched for one collection.
pub trait ResultTransform: Send + Sync {
    fn transform_results(&self, records: Vec<Record>) -> Vec<Record>;
}

impl<F> QueryTransform for F
where
    F: Fn(&mut RecordQuery, &Value) + Send + Sync,
{
    fn transform_query(&self, query: &mut RecordQuery, raw_response: &Value) {
        self(query, raw_response);
    }
}

impl<F> ResultTransform for F
where
    F: Fn(Vec<Record>) -> Vec<Record> + Send + Sync,
{
    fn transform_results(&self, records: Vec<Record>) -> Vec<Record> {
        self(records)
    }
}
