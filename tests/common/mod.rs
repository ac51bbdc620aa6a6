//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, YOUTUBE_URL_1};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_submit_download() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::as_user(server.base_url.clone(), "alice");
//!
//!     let response = client.create_download(YOUTUBE_URL_1).await;
//!     assert_eq!(response.status(), StatusCode::ACCEPTED);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{fake_audio_bytes, ScriptedExtractor, ScriptedSearch};
pub use server::{TestServer, TestServerOptions};
