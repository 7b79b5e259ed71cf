//! SQLite persistence layer for the Triage report server.
//!
//! Connection management (serialized writer + read pool), versioned
//! migrations, one query module per table family, and garbage collection
//! of unreferenced rows.

pub mod connection;
pub mod gc;
pub mod migrations;
pub mod queries;

pub use connection::DatabaseManager;
