//! Deep pagination over a point-in-time snapshot.
//!
//! The cursor opens a snapshot on first use, then pages through it with
//! `search_after`, each page's last sort values bounding the next page. The
//! snapshot is owned by a guard whose `Drop` closes it, so it is released
//! exactly once whether the cursor runs dry, the caller stops early or a
//! page request fails.
use scout_core::error::Result;
use scout_core::traits::DocumentStore;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::builder::SearchBuilder;
use crate::result::Hit;

/// Stable low-level ordering used when the search declares no sort.
const TIE_BREAKER_FIELD: &str = "_shard_doc";

struct SnapshotGuard {
    store: Arc<dyn DocumentStore>,
    id: String,
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        debug!(snapshot = %self.id, "closing snapshot");
        if let Err(e) = self.store.close_snapshot(&self.id) {
            warn!(snapshot = %self.id, error = %e, "failed to close snapshot");
        }
    }
}

pub struct SearchCursor {
    builder: SearchBuilder,
    chunk_size: usize,
    keep_alive: String,
    snapshot: Option<SnapshotGuard>,
    search_after: Option<Vec<Value>>,
    buffer: VecDeque<Hit>,
    exhausted: bool,
    pages_fetched: usize,
    yielded: u64,
}

impl SearchCursor {
    pub fn new(builder: SearchBuilder, chunk_size: usize, keep_alive: &str) -> Self {
        Self {
            builder,
            chunk_size: chunk_size.max(1),
            keep_alive: keep_alive.to_string(),
            snapshot: None,
            search_after: None,
            buffer: VecDeque::new(),
            exhausted: false,
            pages_fetched: 0,
            yielded: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Hand each fetched page to `f` until the cursor runs dry or `f` breaks.
    pub fn each_chunk<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&[Hit]) -> ControlFlow<()>,
    {
        loop {
            if self.buffer.is_empty() {
                if self.exhausted {
                    return Ok(());
                }
                self.advance()?;
                continue;
            }
            let chunk: Vec<Hit> = self.buffer.drain(..).collect();
            if f(&chunk).is_break() {
                self.finish();
                return Ok(());
            }
        }
    }

    fn advance(&mut self) -> Result<()> {
        let result = self.fetch_page();
        if result.is_err() {
            self.finish();
        }
        result
    }

    fn fetch_page(&mut self) -> Result<()> {
        let snapshot_id = self.snapshot_id()?;

        let mut page = self.builder.clone();
        page.point_in_time(&snapshot_id, Some(self.keep_alive.as_str()));
        page.from = None;
        page.size = Some(self.chunk_size);
        page.search_after.clone_from(&self.search_after);
        if page.sort.is_empty() {
            page.sort(json!({ TIE_BREAKER_FIELD: "asc" }));
        }

        let result = page.execute()?;
        self.pages_fetched += 1;
        if let Some(id) = result.raw().get("pit_id").and_then(Value::as_str) {
            if let Some(guard) = self.snapshot.as_mut() {
                id.clone_into(&mut guard.id);
            }
        }

        let exact_total = exact_total(result.raw());
        let hits = result.into_hits();
        self.yielded += hits.len() as u64;
        debug!(page = self.pages_fetched, hits = hits.len(), "cursor page fetched");
        let last_sort = hits
            .last()
            .map(|hit| hit.sort_values().to_vec())
            .filter(|values| !values.is_empty());
        // An exact total saves the trailing empty page when the last page is full.
        let drained = exact_total.is_some_and(|total| self.yielded >= total);
        match last_sort {
            Some(values) if hits.len() >= self.chunk_size && !drained => self.search_after = Some(values),
            _ => self.finish(),
        }
        self.buffer.extend(hits);
        Ok(())
    }

    fn snapshot_id(&mut self) -> Result<String> {
        if let Some(guard) = &self.snapshot {
            return Ok(guard.id.clone());
        }
        let store = self.builder.connection()?.store().clone();
        let indices = self.builder.indices();
        let id = store.open_snapshot(&indices, &self.keep_alive)?;
        debug!(snapshot = %id, indices = ?indices, "opened snapshot");
        self.snapshot = Some(SnapshotGuard { store, id: id.clone() });
        Ok(id)
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.snapshot = None;
    }
}

/// Total hit count when the engine reports it as exact.
fn exact_total(response: &Value) -> Option<u64> {
    match response.pointer("/hits/total")? {
        Value::Number(n) => n.as_u64(),
        Value::Object(total) if total.get("relation").and_then(Value::as_str) == Some("eq") => {
            total.get("value").and_then(Value::as_u64)
        }
        _ => None,
    }
}

impl Iterator for SearchCursor {
    type Item = Result<Hit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                return Some(Ok(hit));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.advance() {
                return Some(Err(e));
            }
        }
    }
}
