//! PostgreSQL storage backend for the Dentora clinic server.
//!
//! Uses `sqlx-core`/`sqlx-postgres` directly with embedded migrations, so a
//! single binary can boot against an empty database. The notification queue
//! shares the same pool.

pub mod config;
pub mod error;
pub mod migrations;
pub mod notification_storage;
pub mod pool;
pub mod queries;
pub mod storage;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use notification_storage::PostgresNotificationQueue;
pub use pool::{create_pool, test_connection};
pub use storage::PostgresStorage;
