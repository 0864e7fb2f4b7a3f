//! HTTP API server for the Dentora clinic management system.
//!
//! Exposes patients, budgets, treatment sessions, schedule blocks,
//! prescriptions, catalog, documents, notifications and reports as a JSON
//! API over axum, backed by an in-memory or PostgreSQL storage backend.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod reminders;
pub mod routes;
pub mod server;
pub mod state;
pub mod validation;

pub use config::{AppConfig, AuthConfig, ServerConfig, StorageBackend, StorageConfig};
pub use error::ApiError;
pub use observability::{apply_logging_level, init_tracing};
pub use server::{DentoraServer, ServerBuilder, build_app};
pub use state::AppState;
