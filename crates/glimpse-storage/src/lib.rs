//! Glimpse Storage Library
//!
//! Location-addressed object storage. A store serves exactly one Location
//! scheme (e.g. `blob`); the Location path is the key inside the backend.
//!
//! # Contract
//!
//! - `store` consumes its reader on every path and never exposes a partially
//!   written object to a later `load`.
//! - `load` is read-only and yields both the bytes and a fetch URL that an
//!   external service can use to retrieve the same object.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use glimpse_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryStorage;
pub use traits::{ByteStream, ObjectReader, ObjectStore, StorageError, StorageResult, StoredObject};
