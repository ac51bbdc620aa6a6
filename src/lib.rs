//! Pezzottify Ingest Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod download_manager;
pub mod extractor;
pub mod matcher;
pub mod object_store;
pub mod retry;
pub mod server;
pub mod source_validator;
pub mod sqlite_persistence;
pub mod track_store;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerState};
