//! Core building blocks for the Triage report server.
//!
//! Shared types (report model, status enums, checker identity), one error
//! enum per subsystem, layered TOML configuration, the cooperative
//! cancellation trait, and tracing setup. No database code lives here.

pub mod config;
pub mod errors;
pub mod logging;
pub mod traits;
pub mod types;
