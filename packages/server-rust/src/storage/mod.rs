//! Multi-layer document storage.
//!
//! Three layers, narrower at the top than the teacher's four because this
//! domain has no CRDT merge or cluster replication to account for:
//!
//! - **Engine** ([`engine::StorageEngine`]): in-memory keyed storage with
//!   cursor-based filtered/ordered scans.
//! - **Store** ([`store::DocumentStore`]): single-partition read/query API
//!   and the entry point into [`transaction::Transaction`].
//! - **Backend** ([`backend::DocumentBackend`]): the external-persistence
//!   seam a durable deployment plugs into; this crate ships only
//!   [`backends::NullBackend`].

pub mod backend;
pub mod backends;
pub mod document;
pub mod engine;
pub mod engines;
pub mod factory;
pub mod store;
pub mod transaction;

pub use backend::DocumentBackend;
pub use document::Document;
pub use engine::{FetchResult, IterationCursor, StorageEngine};
pub use factory::DocumentStoreFactory;
pub use store::DocumentStore;
pub use transaction::Transaction;
