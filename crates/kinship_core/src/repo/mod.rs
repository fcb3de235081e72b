//! Persistence boundary of the engine.
//!
//! # Responsibility
//! - Define the `TreeStore` contract the service loads snapshots from and
//!   commits batches to.
//! - Keep SQL inside the SQLite adapter.

pub mod sqlite_store;
pub mod tree_store;

pub use sqlite_store::SqliteTreeStore;
pub use tree_store::{StoreError, StoreResult, TreeStore};
