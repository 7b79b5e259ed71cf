//! The mass report storage pipeline.
//!
//! Takes a batch of analyzer-produced reports (a "run"), reconciles it
//! against the previously stored state of the same-named run, and commits
//! a consistent, concurrency-safe update: content-addressed file storage,
//! checker-identity bootstrapping, run locking, detection-status
//! transitions, and background task execution.

pub mod api;
pub mod archive;
pub mod checker_registry;
pub mod context;
pub mod metadata;
pub mod orchestrator;
pub mod parser;
pub mod reconcile;
pub mod review_status;
pub mod run_lock;
pub mod skipfile;
pub mod source_store;
pub mod tasks;

pub use api::ReportService;
pub use context::ServerContext;
pub use orchestrator::{MassStoreRun, StoreParams, StoreSummary};
