//! Bulk document writes with aggregated per-item failures.
use scout_core::error::{Error, Result};
use scout_core::traits::DocumentStore;
use scout_core::types::{BulkFailure, BulkOperation, Meta, RecordKey};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::Connection;

pub struct BulkWriter {
    store: Arc<dyn DocumentStore>,
}

impl BulkWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn for_connection(connection: &Connection) -> Self {
        Self::new(connection.store().clone())
    }

    pub fn index_documents<I>(&self, index: &str, documents: I) -> Result<Value>
    where
        I: IntoIterator<Item = (RecordKey, Meta)>,
    {
        let operations: Vec<BulkOperation> = documents
            .into_iter()
            .map(|(key, document)| BulkOperation::Index { index: index.to_string(), key, document })
            .collect();
        self.write(&operations)
    }

    pub fn delete_documents(&self, index: &str, keys: &[RecordKey]) -> Result<Value> {
        let operations: Vec<BulkOperation> = keys
            .iter()
            .map(|key| BulkOperation::Delete { index: index.to_string(), key: key.clone() })
            .collect();
        self.write(&operations)
    }

    /// Send `operations` in one round trip.
    ///
    /// Every item the store reports as failed ends up in one
    /// `Error::BulkWrite`.
    pub fn write(&self, operations: &[BulkOperation]) -> Result<Value> {
        if operations.is_empty() {
            return Ok(json!({ "errors": false, "items": [] }));
        }
        let response = self.store.bulk_write(operations)?;
        debug!(operations = operations.len(), "bulk write sent");
        if response.get("errors").and_then(Value::as_bool) != Some(true) {
            return Ok(response);
        }

        let failures = collect_failures(operations, &response);
        if failures.is_empty() {
            return Err(Error::InvalidResponse(
                "bulk response flags errors but lists no failed item".to_string(),
            ));
        }
        warn!(failed = failures.len(), "bulk write reported failures");
        Err(Error::BulkWrite { failures })
    }
}

/// Items are matched to operations by position; the item's own index and
/// id win when present.
fn collect_failures(operations: &[BulkOperation], response: &Value) -> Vec<BulkFailure> {
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .zip(operations)
        .filter_map(|(item, operation)| {
            let (action, outcome) = item.as_object()?.iter().next()?;
            let reason = outcome.get("error")?.clone();
            let index = outcome
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or(operation.index())
                .to_string();
            let key = outcome
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or(operation.key())
                .to_string();
            Some(BulkFailure { action: action.clone(), index, key, reason })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn failures_take_item_fields_and_fall_back_to_operation() {
        let operations = vec![
            BulkOperation::Index { index: "books".into(), key: "1".into(), document: Map::new() },
            BulkOperation::Delete { index: "books".into(), key: "2".into() },
            BulkOperation::Index { index: "books".into(), key: "3".into(), document: Map::new() },
        ];
        let response = json!({
            "errors": true,
            "items": [
                { "index": { "_index": "books_v1", "_id": "1", "status": 201 } },
                { "delete": { "status": 404, "error": { "type": "not_found" } } },
                { "index": { "_index": "books_v1", "_id": "3", "status": 400, "error": "mapping" } }
            ]
        });

        let failures = collect_failures(&operations, &response);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].action, "delete");
        assert_eq!(failures[0].index, "books");
        assert_eq!(failures[0].key, "2");
        assert_eq!(failures[1].index, "books_v1");
        assert_eq!(failures[1].reason, json!("mapping"));
    }
}
