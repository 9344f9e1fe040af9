//! Concrete [`super::engine::StorageEngine`] implementations.

mod memory;

pub use memory::HashMapStorage;
