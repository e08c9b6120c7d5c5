//! scout-search
//!
//! Builds search requests against one or more record collections, runs them
//! through a [`scout_core::traits::DocumentStore`] and hydrates hits into
//! domain records with one batched fetch per collection. See `builder` for
//! the entry point, `cursor` for deep pagination.
pub mod alias;
pub mod bool_query;
pub mod builder;
pub mod bulk;
pub mod context;
pub mod cursor;
pub mod execute;
pub mod paginator;
pub mod request;
pub mod resolver;
pub mod result;

pub use alias::AliasRegistry;
pub use bool_query::{BoolQuery, Occur};
pub use builder::SearchBuilder;
pub use bulk::BulkWriter;
pub use context::{Connection, SearchContext};
pub use cursor::SearchCursor;
pub use paginator::{ItemView, PageItems, Paginator};
pub use resolver::{CollectionOptions, ModelResolver};
pub use result::{Hit, RawHit, SearchResult, SuggestOption, Suggestion};
