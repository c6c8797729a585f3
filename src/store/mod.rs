//! Persistence layer — libSQL-backed storage for sessions, accounts,
//! and the inbound Cursor.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::RecordStore;
