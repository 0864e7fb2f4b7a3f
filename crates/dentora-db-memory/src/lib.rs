//! In-memory storage backend for the Dentora clinic server.
//!
//! Implements the repository traits from `dentora-storage` on top of
//! `dashmap`, so the server and its tests can run without PostgreSQL.
//! Budget lifecycle transitions are serialised through a single mutex; the
//! backend is otherwise lock-free per entity map.

pub mod storage;

pub use dentora_storage::{ClinicStorage, StorageError};
pub use storage::InMemoryStorage;

/// Type alias for a shareable storage instance.
pub type DynClinicStorage = std::sync::Arc<dyn ClinicStorage>;

/// Creates a new in-memory storage instance behind the trait object the
/// server uses.
pub fn create_storage() -> DynClinicStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
