//! Persistence layer — libSQL-backed storage for onboarding state,
//! conversation logs, profiles, and the version ledger.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
