//! Retry/backoff executor shared by every component that talks to an
//! external system (metadata service, object store, extraction tool).

mod executor;
mod policy;

pub use executor::{execute, RetryError, Retryable};
pub use policy::{is_retryable_message, is_retryable_status, RetryPolicy};
