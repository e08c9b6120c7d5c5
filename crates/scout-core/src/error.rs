use thiserror::Error;

use crate::types::BulkFailure;

/// Failure reported by a document-store transport.
///
/// `NotFound` is kept apart from every other failure because callers such as
/// the alias lookup treat a missing index as an empty answer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record type '{0}' is not searchable")]
    NotSearchable(String),

    #[error("Cannot join '{joined}' (connection '{joined_connection}') to '{base}' (connection '{base_connection}'): all joined types must share one connection")]
    IncompatibleConnection {
        base: String,
        base_connection: String,
        joined: String,
        joined_connection: String,
    },

    #[error("Index '{index}' is claimed by both '{existing}' and '{joined}'")]
    AmbiguousIndex {
        index: String,
        existing: String,
        joined: String,
    },

    #[error("Collection '{0}' has not been joined to this search")]
    UnjoinedCollection(String),

    #[error("Unknown connection '{0}'")]
    UnknownConnection(String),

    #[error("Explicit query must not be empty")]
    EmptyQuery,

    #[error("Total hits are not tracked; enable total tracking to paginate")]
    TotalHitsNotTracked,

    #[error("Refusing to run {0} without a must or filter clause")]
    UnfilteredWriteQuery(&'static str),

    #[error("{} bulk operation(s) failed", failures.len())]
    BulkWrite { failures: Vec<BulkFailure> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed search response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Record store failed: {0}")]
    Records(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
