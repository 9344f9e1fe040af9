//! Concrete [`super::backend::DocumentBackend`] implementations.

mod null;

pub use null::NullBackend;
