//! scout-memory
//!
//! In-process stand-ins for the two collaborators the search engine talks
//! to: a document store and a record store. Both keep call logs so tests can
//! assert round-trip counts, and both are safe to share behind an `Arc`.
pub mod document_store;
pub mod query;
pub mod record_store;
pub mod seed;

pub use document_store::{CallCounts, MemoryDocumentStore};
pub use record_store::MemoryRecordStore;
pub use seed::{read_seed_dir, SeedDocument};
