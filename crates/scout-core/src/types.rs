//! Domain types shared by the search engine and its collaborators.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type RecordKey = String;
pub type Meta = Map<String, Value>;

/// Description of one domain record type that can be searched.
///
/// - `name`: identity of the type; joins compare types by this name
/// - `index`: logical collection name the type is indexed under
/// - `connection`: document-store connection, `None` for the configured default
/// - `searchable`: whether the type may take part in a search at all
/// - `soft_deletes`: whether records carry a deletion marker
/// - `key_field`: attribute holding the record key in the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub index: String,
    pub connection: Option<String>,
    pub searchable: bool,
    pub soft_deletes: bool,
    pub key_field: String,
}

impl RecordType {
    pub fn new(name: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            connection: None,
            searchable: true,
            soft_deletes: false,
            key_field: "id".to_string(),
        }
    }

    #[must_use]
    pub fn on_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    #[must_use]
    pub fn with_soft_deletes(mut self) -> Self {
        self.soft_deletes = true;
        self
    }

    #[must_use]
    pub fn unsearchable(mut self) -> Self {
        self.searchable = false;
        self
    }

    #[must_use]
    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    /// Connection name this type lives on, falling back to `default`.
    pub fn connection_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.connection.as_deref().unwrap_or(default)
    }
}

/// A hydrated domain record as returned by the record store.
///
/// `search_metadata` holds the hit fields (`_index`, `_id`, `_score`, ...)
/// of the search hit that produced this record. `relations` holds
/// eager-loaded related records by relation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: String,
    pub key: RecordKey,
    pub attributes: Meta,
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    pub search_metadata: Meta,
}

impl Record {
    pub fn new(record_type: impl Into<String>, key: impl Into<String>, attributes: Meta) -> Self {
        Self {
            record_type: record_type.into(),
            key: key.into(),
            attributes,
            relations: BTreeMap::new(),
            search_metadata: Meta::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Merge hit metadata onto the record; later keys overwrite earlier ones.
    #[must_use]
    pub fn with_search_metadata(mut self, metadata: &Meta) -> Self {
        for (k, v) in metadata {
            self.search_metadata.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn search_metadata(&self) -> &Meta {
        &self.search_metadata
    }
}

/// Equality constraint added to a record query by a query transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub value: Value,
}

/// A fetch-by-keys request against the record store.
///
/// Query transforms receive a mutable handle to this before it is executed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub record_type: RecordType,
    pub keys: Vec<RecordKey>,
    pub relations: Vec<String>,
    pub with_trashed: bool,
    pub constraints: Vec<Constraint>,
}

impl RecordQuery {
    pub fn new(record_type: RecordType, keys: Vec<RecordKey>) -> Self {
        Self {
            record_type,
            keys,
            relations: Vec::new(),
            with_trashed: false,
            constraints: Vec::new(),
        }
    }

    pub fn with(&mut self, relation: impl Into<String>) -> &mut Self {
        let relation = relation.into();
        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
        self
    }

    pub fn where_eq(&mut self, field: impl Into<String>, value: Value) -> &mut Self {
        self.constraints.push(Constraint { field: field.into(), value });
        self
    }
}

/// Which soft-deleted documents a search may see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftDeleteMode {
    #[default]
    ExcludeTrashed,
    WithTrashed,
    OnlyTrashed,
}

/// One document write sent through the bulk endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkOperation {
    Index { index: String, key: RecordKey, document: Meta },
    Delete { index: String, key: RecordKey },
}

impl BulkOperation {
    pub fn action(&self) -> &'static str {
        match self {
            BulkOperation::Index { .. } => "index",
            BulkOperation::Delete { .. } => "delete",
        }
    }

    pub fn index(&self) -> &str {
        match self {
            BulkOperation::Index { index, .. } | BulkOperation::Delete { index, .. } => index,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            BulkOperation::Index { key, .. } | BulkOperation::Delete { key, .. } => key,
        }
    }
}

/// A document the bulk endpoint reported as failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub action: String,
    pub index: String,
    pub key: RecordKey,
    pub reason: Value,
}

/// A request as handed to the document-store transport.
///
/// `index` lists target collections (empty when a snapshot is bound),
/// `body` is the request body and `params` carries URL-level options such
/// as `preference`, `routing` or `search_type`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index: Vec<String>,
    #[serde(default)]
    pub body: Meta,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Meta,
}

/// Aliases reported per physical index by an alias lookup.
pub type AliasLookup = BTreeMap<String, Vec<String>>;
