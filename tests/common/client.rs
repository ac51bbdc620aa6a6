//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all ingest-server endpoints.
//!
//! When API routes or request formats change, update only this file.

#![allow(dead_code)]

use super::constants::*;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// HTTP test client that identifies itself with `X-User-Id`
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    user_id: Option<String>,
}

impl TestClient {
    /// Creates a client that sends no user header (the anonymous owner)
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            user_id: None,
        }
    }

    /// Creates a client acting as `user_id`
    pub fn as_user(base_url: String, user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::new(base_url)
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.user_id {
            Some(user) => builder.header("X-User-Id", user),
            None => builder,
        }
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// GET /health
    pub async fn health(&self) -> Response {
        self.request(reqwest::Method::GET, "/health")
            .send()
            .await
            .expect("Health request failed")
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    /// POST /downloads with just a URL
    pub async fn create_download(&self, url: &str) -> Response {
        self.create_download_with(json!({ "url": url })).await
    }

    /// POST /downloads with an arbitrary body
    pub async fn create_download_with(&self, body: Value) -> Response {
        self.request(reqwest::Method::POST, "/downloads")
            .json(&body)
            .send()
            .await
            .expect("Create download request failed")
    }

    /// POST /downloads with a raw, possibly malformed, body
    pub async fn create_download_raw(&self, body: &str) -> Response {
        self.request(reqwest::Method::POST, "/downloads")
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Create download request failed")
    }

    /// GET /downloads
    pub async fn list_downloads(&self, limit: Option<usize>) -> Response {
        let path = match limit {
            Some(limit) => format!("/downloads?limit={}", limit),
            None => "/downloads".to_string(),
        };
        self.request(reqwest::Method::GET, &path)
            .send()
            .await
            .expect("List downloads request failed")
    }

    /// GET /downloads/{id}
    pub async fn get_download(&self, job_id: &str) -> Response {
        self.request(reqwest::Method::GET, &format!("/downloads/{}", job_id))
            .send()
            .await
            .expect("Get download request failed")
    }

    /// DELETE /downloads/{id}
    pub async fn cancel_download(&self, job_id: &str) -> Response {
        self.request(reqwest::Method::DELETE, &format!("/downloads/{}", job_id))
            .send()
            .await
            .expect("Cancel download request failed")
    }

    /// Submits `url` and returns the new job id
    pub async fn submit(&self, url: &str) -> String {
        let response = self.create_download(url).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: Value = response.json().await.expect("Invalid create response");
        body["job_id"]
            .as_str()
            .expect("Missing job_id")
            .to_string()
    }

    /// Polls the job until its status is `status`, returning the job body
    ///
    /// # Panics
    ///
    /// Panics if the job doesn't get there within `JOB_SETTLE_TIMEOUT_MS`.
    pub async fn wait_for_status(&self, job_id: &str, status: &str) -> Value {
        let start = Instant::now();
        let mut last = Value::Null;
        while start.elapsed() < Duration::from_millis(JOB_SETTLE_TIMEOUT_MS) {
            let response = self.get_download(job_id).await;
            assert_eq!(response.status(), StatusCode::OK);
            last = response.json().await.expect("Invalid job body");
            if last["status"] == status {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(WORKER_POLL_MS)).await;
        }
        panic!("Job {} never reached {}, last seen: {}", job_id, status, last);
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// POST /validate/url
    pub async fn validate_url(&self, url: &str) -> Response {
        self.request(reqwest::Method::POST, "/validate/url")
            .json(&json!({ "url": url }))
            .send()
            .await
            .expect("Validate request failed")
    }

    /// GET /validate/url?url=
    pub async fn validate_url_query(&self, url: &str) -> Response {
        self.request(
            reqwest::Method::GET,
            &format!("/validate/url?url={}", urlencoding::encode(url)),
        )
        .send()
        .await
        .expect("Validate request failed")
    }

    /// GET /validate/sources
    pub async fn supported_sources(&self) -> Response {
        self.request(reqwest::Method::GET, "/validate/sources")
            .send()
            .await
            .expect("Sources request failed")
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    /// GET /stream/{id}
    pub async fn stream_track(&self, track_id: &str) -> Response {
        self.request(reqwest::Method::GET, &format!("/stream/{}", track_id))
            .send()
            .await
            .expect("Stream request failed")
    }

    /// GET /stream/{id} with a `Range` header
    pub async fn stream_track_range(&self, track_id: &str, range: &str) -> Response {
        self.request(reqwest::Method::GET, &format!("/stream/{}", track_id))
            .header("Range", range)
            .send()
            .await
            .expect("Stream request failed")
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    /// GET on any path, for fallback and header tests
    pub async fn get(&self, path: &str) -> Response {
        self.request(reqwest::Method::GET, path)
            .send()
            .await
            .expect("Request failed")
    }

    /// GET with extra headers
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut builder = self.request(reqwest::Method::GET, path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.send().await.expect("Request failed")
    }
}
