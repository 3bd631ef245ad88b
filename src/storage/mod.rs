//! Storage backends
//!
//! The normalizer, aggregator and alias tools talk to storage through the
//! `DomainStore` trait. `SqliteStore` is the persistent implementation.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{DomainStore, ExtractFilter, OpenStore, StorageError, StorageResult, StoreCounts};
