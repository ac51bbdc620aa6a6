use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::download_routes::download_routes;
use super::error::{not_found, request_id};
use super::metrics::{init_metrics, metrics_handler};
use super::stream_track::stream_track;
use super::track_routes::track_routes;
use super::validate_routes::validate_routes;
use super::websocket::ws_handler;
use super::{log_requests, state::ServerState};

#[derive(Serialize)]
struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub git_hash: String,
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        git_hash: state.hash.clone(),
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

pub fn make_app(state: ServerState) -> Router {
    init_metrics();
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/downloads", download_routes())
        .nest("/validate", validate_routes())
        .nest("/tracks", track_routes())
        .route("/stream/{track_id}", get(stream_track))
        .route("/ws/progress", get(ws_handler))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Serves `state` until `shutdown` fires.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherSettings;
    use crate::download_manager::testing::FakeSearch;
    use crate::download_manager::{
        DownloadQueueStore, JobControl, JobStatus, ProgressNotifier, SqliteDownloadQueueStore,
    };
    use crate::matcher::{MatchCandidate, MatchReason, MetadataMatcher};
    use crate::object_store::{ContentAddressedStore, InMemoryObjectStore, ObjectStore};
    use crate::server::ServerConfig;
    use crate::source_validator::SourceRegistry;
    use crate::track_store::{NewTrack, SqliteTrackStore, TrackStore};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt; // for `oneshot`

    struct TestApp {
        app: Router,
        queue: Arc<SqliteDownloadQueueStore>,
        tracks: Arc<SqliteTrackStore>,
        objects: Arc<InMemoryObjectStore>,
        notifier: ProgressNotifier,
    }

    fn test_app() -> TestApp {
        test_app_with_matcher(None)
    }

    fn test_app_with_matcher(matcher: Option<Arc<MetadataMatcher>>) -> TestApp {
        let queue = Arc::new(SqliteDownloadQueueStore::in_memory().unwrap());
        let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let objects = Arc::new(InMemoryObjectStore::new("media"));
        let notifier = ProgressNotifier::new();
        let state = ServerState {
            config: ServerConfig::default(),
            start_time: Instant::now(),
            hash: "123456".to_owned(),
            queue: queue.clone(),
            tracks: tracks.clone(),
            audio_store: Arc::new(ContentAddressedStore::new(objects.clone(), "mp3")),
            sources: Arc::new(SourceRegistry::default()),
            matcher,
            notifier: notifier.clone(),
            job_control: JobControl::new(),
        };
        TestApp {
            app: make_app(state),
            queue,
            tracks,
            objects,
            notifier,
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_download(user: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/downloads")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-User-Id", user)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Stores `bytes` as the audio of a new track and returns the track id.
    async fn stored_track(t: &TestApp, bytes: Vec<u8>) -> String {
        let (track, _) = t
            .tracks
            .find_or_create(NewTrack {
                identity_hash: "abc123".to_string(),
                title: "Get Lucky".to_string(),
                artist: "Daft Punk".to_string(),
                album: None,
                duration_ms: Some(248_000),
                source_url: "https://www.youtube.com/watch?v=aaaaaaaaaaa".to_string(),
                source_type: "youtube".to_string(),
            })
            .unwrap();
        let key = "audio/abc123/audio.mp3";
        let size = t
            .objects
            .put_bytes(key, bytes, "audio/mpeg")
            .await
            .unwrap();
        t.tracks
            .set_storage(&track.id, key, Some(size as i64), Some("audio/mpeg"))
            .unwrap();
        track.id
    }

    #[tokio::test]
    async fn health_reports_version_and_hash() {
        let t = test_app();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = t.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["git_hash"], "123456");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unknown_route_uses_error_envelope() {
        let t = test_app();
        let request = Request::builder()
            .uri("/nope")
            .header("X-Request-ID", "trace-me")
            .body(Body::empty())
            .unwrap();
        let response = t.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "trace-me");

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["request_id"], "trace-me");
    }

    #[tokio::test]
    async fn create_download_enqueues_job() {
        let t = test_app();
        let mut events = t.notifier.subscribe();
        let request = post_download(
            "user-1",
            serde_json::json!({
                "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "source_type": "youtube",
                "page_metadata": {"title": "Never Gonna Give You Up", "thumbnail": null}
            }),
        );
        let response = t.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = json_body(response).await;
        assert_eq!(body["status"], "pending");
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let job = t.queue.get_job(&job_id).unwrap().unwrap();
        assert_eq!(job.user_id, "user-1");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.page_title.as_deref(), Some("Never Gonna Give You Up"));

        let event = events.try_recv().unwrap();
        assert_eq!(event.job_id, job_id);
        assert_eq!(event.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn create_download_rejects_bad_input() {
        let t = test_app();

        let cases = [
            (serde_json::json!({"url": "https://vimeo.com/1"}), "UNSUPPORTED_SOURCE"),
            (
                serde_json::json!({"url": "https://soundcloud.com/search"}),
                "VALIDATION_ERROR",
            ),
            (
                serde_json::json!({"url": "https://www.youtube.com/playlist?list=PL123"}),
                "VALIDATION_ERROR",
            ),
            (serde_json::json!({"link": "https://youtu.be/x"}), "INVALID_REQUEST"),
        ];
        for (body, code) in cases {
            let response = t
                .app
                .clone()
                .oneshot(post_download("user-1", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(body["error"]["code"], code);
            assert!(!body["error"]["request_id"].as_str().unwrap().is_empty());
        }
        assert_eq!(t.queue.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn jobs_are_visible_only_to_their_owner() {
        let t = test_app();
        let response = t
            .app
            .clone()
            .oneshot(post_download(
                "alice",
                serde_json::json!({"url": "https://youtu.be/dQw4w9WgXcQ"}),
            ))
            .await
            .unwrap();
        let job_id = json_body(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let get = |user: &str| {
            Request::builder()
                .uri(format!("/downloads/{}", job_id))
                .header("X-User-Id", user)
                .body(Body::empty())
                .unwrap()
        };

        let response = t.app.clone().oneshot(get("alice")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["job_id"], job_id);
        assert_eq!(body["progress"], 0);
        assert_eq!(body["source_type"], "youtube");

        let response = t.app.clone().oneshot(get("bob")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "JOB_NOT_FOUND");

        let list = Request::builder()
            .uri("/downloads")
            .header("X-User-Id", "bob")
            .body(Body::empty())
            .unwrap();
        let response = t.app.clone().oneshot(list).await.unwrap();
        assert_eq!(json_body(response).await["jobs"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn cancel_pending_then_conflict() {
        let t = test_app();
        let response = t
            .app
            .clone()
            .oneshot(post_download(
                "alice",
                serde_json::json!({"url": "https://youtu.be/dQw4w9WgXcQ"}),
            ))
            .await
            .unwrap();
        let job_id = json_body(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(format!("/downloads/{}", job_id))
                .header("X-User-Id", "alice")
                .body(Body::empty())
                .unwrap()
        };

        let response = t.app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "cancelled");

        let response = t.app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "JOB_NOT_CANCELLABLE");
        assert_eq!(body["error"]["details"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn validate_endpoints() {
        let t = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/validate/url")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({"url": "soundcloud.com/artist-name/track-name"}).to_string(),
            ))
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["source"], "soundcloud");
        assert_eq!(body["media_type"], "track");

        let request = Request::builder()
            .uri("/validate/url?url=https%3A%2F%2Fexample.com%2Fsong")
            .body(Body::empty())
            .unwrap();
        let body = json_body(t.app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["valid"], false);

        let request = Request::builder()
            .uri("/validate/url")
            .body(Body::empty())
            .unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri("/validate/sources")
            .body(Body::empty())
            .unwrap();
        let body = json_body(t.app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["sources"][0]["source"], "youtube");
        assert_eq!(body["sources"][1]["source"], "soundcloud");
    }

    fn stream_request(track_id: &str, range: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(format!("/stream/{}", track_id));
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn stream_serves_full_and_partial_content() {
        let t = test_app();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let track_id = stored_track(&t, data.clone()).await;

        let response = t
            .app
            .clone()
            .oneshot(stream_request(&track_id, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=86400"
        );
        assert_eq!(body_bytes(response).await, data);

        let response = t
            .app
            .clone()
            .oneshot(stream_request(&track_id, Some("bytes=0-499")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-499/1000");
        assert_eq!(body_bytes(response).await, data[..500].to_vec());

        let response = t
            .app
            .clone()
            .oneshot(stream_request(&track_id, Some("bytes=-100")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 900-999/1000"
        );
        assert_eq!(body_bytes(response).await, data[900..].to_vec());
    }

    #[tokio::test]
    async fn stream_rejects_unsatisfiable_range() {
        let t = test_app();
        let track_id = stored_track(&t, vec![7u8; 1000]).await;

        for range in ["bytes=2000-", "bytes=500-100", "bytes=-", "lines=1-2"] {
            let response = t
                .app
                .clone()
                .oneshot(stream_request(&track_id, Some(range)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
            assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
            let body = json_body(response).await;
            assert_eq!(body["error"]["code"], "RANGE_NOT_SATISFIABLE");
        }
    }

    #[tokio::test]
    async fn stream_missing_track_or_audio() {
        let t = test_app();
        let response = t
            .app
            .clone()
            .oneshot(stream_request("missing", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "TRACK_NOT_FOUND");

        let track_id = stored_track(&t, vec![1, 2, 3]).await;
        t.objects.delete("audio/abc123/audio.mp3").await.unwrap();
        let response = t
            .app
            .clone()
            .oneshot(stream_request(&track_id, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn metrics_expose_requests_by_route_and_pending_jobs() {
        let t = test_app();
        t.app
            .clone()
            .oneshot(post_download(
                "alice",
                serde_json::json!({"url": "https://youtu.be/dQw4w9WgXcQ"}),
            ))
            .await
            .unwrap();
        let missing = Request::builder()
            .uri("/downloads/not-a-job")
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        t.app.clone().oneshot(missing).await.unwrap();

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(body_bytes(response).await).unwrap();

        assert!(text.contains("ingest_download_queue_pending"));
        assert!(text.contains("path=\"/downloads/{id}\""));
        assert!(text.contains("status=\"404\""));
        assert!(!text.contains("not-a-job"));
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn suggestion(recording_id: &str, confidence: f64) -> MatchCandidate {
        MatchCandidate {
            recording_id: recording_id.to_string(),
            title: "Get Lucky".to_string(),
            artist: "Daft Punk".to_string(),
            artist_id: Some("056e4f3e-d505-4dad-8ec1-d04f521cbb56".to_string()),
            album: Some("Random Access Memories".to_string()),
            album_id: Some("1b3c5d7e-9f1a-4b2c-8d3e-5f7a9b1c3d5e".to_string()),
            duration_ms: Some(248_000),
            confidence,
            reasons: vec![MatchReason::TitleMatch],
        }
    }

    #[tokio::test]
    async fn confirm_match_verifies_track_and_clears_suggestions() {
        let t = test_app();
        let track_id = stored_track(&t, vec![1, 2, 3]).await;
        let recording = "3a5b7c9d-1e2f-4a6b-8c0d-2e4f6a8b0c1d";
        t.tracks
            .set_suggestions(
                &track_id,
                &[suggestion(recording, 0.7), suggestion("9f8e7d6c-5b4a-4392-8170-6f5e4d3c2b1a", 0.5)],
            )
            .unwrap();

        let request = Request::builder()
            .uri(format!("/tracks/{}", track_id))
            .body(Body::empty())
            .unwrap();
        let body = json_body(t.app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["mb_verified"], false);
        assert_eq!(body["mb_suggestions"][0]["recording_id"], recording);

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                &format!("/tracks/{}/confirm-match", track_id),
                serde_json::json!({"recording_id": recording}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["mb_verified"], true);
        assert_eq!(body["mb_recording_id"], recording);
        assert_eq!(body["mb_release_id"], "1b3c5d7e-9f1a-4b2c-8d3e-5f7a9b1c3d5e");
        assert_eq!(body["album"], "Random Access Memories");
        assert!(body["mb_suggestions"].is_null());

        let stored = t.tracks.get_track(&track_id).unwrap().unwrap();
        assert!(stored.mb_verified);
        assert_eq!(stored.mb_suggestions, None);
    }

    #[tokio::test]
    async fn confirm_match_errors() {
        let t = test_app();
        let track_id = stored_track(&t, vec![1, 2, 3]).await;

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                "/tracks/missing/confirm-match",
                serde_json::json!({"recording_id": "3a5b7c9d-1e2f-4a6b-8c0d-2e4f6a8b0c1d"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "TRACK_NOT_FOUND");

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                &format!("/tracks/{}/confirm-match", track_id),
                serde_json::json!({"recording_id": "not-a-uuid"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["field"], "recording_id");

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                &format!("/tracks/{}/confirm-match", track_id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_REQUEST");
        assert!(!t.tracks.get_track(&track_id).unwrap().unwrap().mb_verified);
    }

    #[tokio::test]
    async fn rematch_stores_verified_result() {
        let search = Arc::new(FakeSearch::default());
        search.set_hits(vec![FakeSearch::hit("rec-1", "Daft Punk", "Get Lucky", 248_000)]);
        let matcher = MetadataMatcher::new(search.clone(), MatcherSettings::default());
        let t = test_app_with_matcher(Some(Arc::new(matcher)));
        let track_id = stored_track(&t, vec![1, 2, 3]).await;

        let response = t
            .app
            .clone()
            .oneshot(post_json(&format!("/tracks/{}/match", track_id), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["track_id"], track_id);
        assert_eq!(body["verified"], true);
        assert_eq!(body["best_match"]["recording_id"], "rec-1");
        assert_eq!(search.call_count(), 1);

        let stored = t.tracks.get_track(&track_id).unwrap().unwrap();
        assert!(stored.mb_verified);
        assert_eq!(stored.mb_recording_id.as_deref(), Some("rec-1"));
        assert_eq!(stored.mb_release_id.as_deref(), Some("rec-1-release"));
    }

    #[tokio::test]
    async fn rematch_needs_matching_enabled() {
        let t = test_app();
        let track_id = stored_track(&t, vec![1, 2, 3]).await;
        let response = t
            .app
            .clone()
            .oneshot(post_json(&format!("/tracks/{}/match", track_id), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3600 * 2 + 60 * 3 + 4)),
            "1d 02:03:04"
        );
    }
}
