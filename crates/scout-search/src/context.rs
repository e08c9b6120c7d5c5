use scout_core::config::Settings;
use scout_core::error::{Error, Result};
use scout_core::traits::{DocumentStore, RecordStore};
use scout_core::types::RecordType;
use std::collections::HashMap;
use std::sync::Arc;

use crate::alias::AliasRegistry;
use crate::builder::SearchBuilder;

/// A named document-store connection and the alias cache that belongs to it.
#[derive(Clone)]
pub struct Connection {
    name: String,
    store: Arc<dyn DocumentStore>,
    aliases: Arc<AliasRegistry>,
}

impl Connection {
    pub fn new(name: impl Into<String>, store: Arc<dyn DocumentStore>, settings: &Settings) -> Self {
        let aliases = Arc::new(AliasRegistry::new(store.clone(), settings.alias_cache_ttl()));
        Self { name: name.into(), store, aliases }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn aliases(&self) -> &Arc<AliasRegistry> {
        &self.aliases
    }
}

/// Everything a search needs from its surroundings, passed in explicitly.
#[derive(Clone)]
pub struct SearchContext {
    settings: Arc<Settings>,
    connections: HashMap<String, Connection>,
    records: Arc<dyn RecordStore>,
}

impl SearchContext {
    pub fn new(settings: Settings, records: Arc<dyn RecordStore>) -> Self {
        Self { settings: Arc::new(settings), connections: HashMap::new(), records }
    }

    #[must_use]
    pub fn with_connection(mut self, name: &str, store: Arc<dyn DocumentStore>) -> Self {
        let connection = Connection::new(name, store, &self.settings);
        self.connections.insert(name.to_string(), connection);
        self
    }

    pub fn connection(&self, name: &str) -> Result<&Connection> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::UnknownConnection(name.to_string()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Start a search over `record_type`.
    pub fn search(&self, record_type: RecordType) -> Result<SearchBuilder> {
        SearchBuilder::new(self.clone(), record_type)
    }
}
