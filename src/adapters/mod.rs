//! Adapters: SQLite persistence and the HTTP transport.

pub mod http;
pub mod sqlite;
