//! Record store boundary.
//!
//! A generic, kind-keyed store of JSON records plus a typed repository on top
//! of it. The core reads and writes only through these traits.

pub mod in_memory;
pub mod repository;
pub mod r#trait;

pub use in_memory::InMemoryDataStore;
pub use repository::{Repository, StoredRecord};
pub use r#trait::{DataStore, EntityKind, StoreError};
