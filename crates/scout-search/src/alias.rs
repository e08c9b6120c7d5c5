//! Alias resolution cache.
//!
//! Maps physical index names and alias names reported by the document store
//! back to the logical collection names registered here. The map is fetched
//! with one batched lookup covering every registered name and kept for a TTL.
//! Registering a name that was not known before drops the cached map.
use scout_core::error::{Result, StoreError};
use scout_core::traits::DocumentStore;
use scout_core::types::AliasLookup;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct AliasState {
    registered: Vec<String>,
    alias_map: HashMap<String, String>,
    fetched_at: Option<Instant>,
    // Bumped on every register/invalidate so an in-flight fetch cannot
    // store a map computed for an older registered set.
    generation: u64,
}

pub struct AliasRegistry {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
    state: Mutex<AliasState>,
    refreshing: AtomicBool,
}

struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AliasRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: Mutex::new(AliasState::default()),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn register_index(&self, name: &str) {
        let mut state = self.state();
        if state.registered.iter().any(|n| n == name) {
            return;
        }
        state.registered.push(name.to_string());
        state.alias_map.clear();
        state.fetched_at = None;
        state.generation += 1;
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.state().registered.iter().any(|n| n == name)
    }

    pub fn registered(&self) -> Vec<String> {
        self.state().registered.clone()
    }

    /// When the last successful fetch completed, if one has since the last reset.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.state().fetched_at
    }

    pub fn cached_aliases(&self) -> HashMap<String, String> {
        self.state().alias_map.clone()
    }

    /// Map `name` to its registered logical name, or return it unchanged.
    pub fn resolve(&self, name: &str) -> Result<String> {
        if self.is_registered(name) {
            return Ok(name.to_string());
        }
        self.refresh_if_stale()?;
        Ok(self
            .state()
            .alias_map
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    pub fn invalidate(&self) {
        let mut state = self.state();
        state.alias_map.clear();
        state.fetched_at = None;
        state.generation += 1;
        self.refreshing.store(false, Ordering::SeqCst);
    }

    fn refresh_if_stale(&self) -> Result<()> {
        let stale = match self.state().fetched_at {
            None => true,
            Some(at) => at.elapsed() > self.ttl,
        };
        if stale {
            self.fetch()?;
        }
        Ok(())
    }

    fn fetch(&self) -> Result<()> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            debug!("alias refresh already in progress; skipping nested fetch");
            return Ok(());
        }
        let _guard = RefreshGuard(&self.refreshing);

        let (names, generation) = {
            let state = self.state();
            (state.registered.clone(), state.generation)
        };
        if names.is_empty() {
            return Ok(());
        }

        let lookup = match self.store.lookup_aliases(&names) {
            Ok(lookup) => lookup,
            Err(StoreError::NotFound(what)) => {
                debug!(%what, "alias lookup found no indices");
                AliasLookup::new()
            }
            Err(e) => return Err(e.into()),
        };
        let alias_map = build_alias_map(&names, &lookup);

        let mut state = self.state();
        if state.generation != generation {
            debug!("registered collections changed during alias refresh; discarding result");
            return Ok(());
        }
        debug!(registered = names.len(), mapped = alias_map.len(), "alias cache refreshed");
        state.alias_map = alias_map;
        state.fetched_at = Some(Instant::now());
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, AliasState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map every physical index and alias in `lookup` to the first registered
/// name it matches. A name that is itself registered maps to itself.
fn build_alias_map(registered: &[String], lookup: &AliasLookup) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (index, aliases) in lookup {
        let target = registered
            .iter()
            .find(|r| *r == index || aliases.iter().any(|a| a == *r));
        let Some(target) = target else { continue };

        for name in std::iter::once(index).chain(aliases.iter()) {
            let mapped = if registered.iter().any(|r| r == name) { name } else { target };
            map.entry(name.clone()).or_insert_with(|| mapped.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn physical_index_maps_to_registered_alias() {
        let mut lookup = AliasLookup::new();
        lookup.insert("books_v2".into(), names(&["books", "library"]));
        let map = build_alias_map(&names(&["books"]), &lookup);

        assert_eq!(map.get("books_v2").map(String::as_str), Some("books"));
        assert_eq!(map.get("books").map(String::as_str), Some("books"));
        assert_eq!(map.get("library").map(String::as_str), Some("books"));
    }

    #[test]
    fn registered_physical_index_maps_to_itself() {
        let mut lookup = AliasLookup::new();
        lookup.insert("authors".into(), names(&["people"]));
        let map = build_alias_map(&names(&["authors"]), &lookup);

        assert_eq!(map.get("authors").map(String::as_str), Some("authors"));
        assert_eq!(map.get("people").map(String::as_str), Some("authors"));
    }

    #[test]
    fn first_registered_name_wins() {
        let mut lookup = AliasLookup::new();
        lookup.insert("idx".into(), names(&["second", "first"]));
        let map = build_alias_map(&names(&["first", "second"]), &lookup);

        assert_eq!(map.get("idx").map(String::as_str), Some("first"));
        assert_eq!(map.get("second").map(String::as_str), Some("second"));
    }

    #[test]
    fn unrelated_indices_are_ignored() {
        let mut lookup = AliasLookup::new();
        lookup.insert("logs".into(), names(&["audit"]));
        assert!(build_alias_map(&names(&["books"]), &lookup).is_empty());
    }
}
