//! HTTP client behaviour against a mock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use schedgen_core::generation::JobStatus;
use schedgen_core::types::JobId;
use schedgen_progress::api::GenerationApi;
use schedgen_progress::cache::MemoryCache;
use schedgen_progress::poller::PollerConfig;
use schedgen_progress::session::Session;
use schedgen_progress::tracker::{GenerationTracker, TrackerDeps};
use schedgen_progress::transport::TransportError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Event, Recorder};

fn api(server: &MockServer, session: Session) -> GenerationApi {
    GenerationApi::new(server.uri(), Arc::new(session), Duration::from_secs(5)).unwrap()
}

fn job() -> JobId {
    JobId::from("job-123")
}

// ---------------------------------------------------------------------------
// Progress endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_progress_parses_the_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "progress": 37,
            "status": "running",
            "stage": "Scheduling Classes",
            "time_remaining_seconds": 95
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = api(&server, Session::anonymous()).get_progress(&job()).await.unwrap();

    assert_eq!(payload.progress, 37.0);
    assert_eq!(payload.job_status(), Some(JobStatus::Running));
    assert_eq!(payload.stage.as_deref(), Some("Scheduling Classes"));
    assert_eq!(payload.time_remaining_seconds, Some(95));
}

#[tokio::test]
async fn get_progress_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&server)
        .await;

    let err = api(&server, Session::anonymous()).get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::NotFound(id) if id == job());
}

#[tokio::test]
async fn get_progress_maps_other_statuses_to_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = api(&server, Session::anonymous()).get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::Api { status: 502, body } if body == "bad gateway");
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = api(&server, Session::anonymous()).get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::Decode(_));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"progress": 1, "status": "running"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = GenerationApi::new(
        server.uri(),
        Arc::new(Session::anonymous()),
        Duration::from_millis(200),
    )
    .unwrap();
    let err = client.get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::Timeout);
}

// ---------------------------------------------------------------------------
// Session handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"progress": 5, "status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::new(Some("abc".into()), None);
    let payload = api(&server, session).get_progress(&job()).await.unwrap();
    assert_eq!(payload.job_status(), Some(JobStatus::Queued));
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_the_request_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "r-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"progress": 64, "status": "running"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(Session::new(Some("stale".into()), Some("r-1".into())));
    let client = GenerationApi::new(server.uri(), Arc::clone(&session), Duration::from_secs(5)).unwrap();

    let payload = client.get_progress(&job()).await.unwrap();
    assert_eq!(payload.progress, 64.0);
    assert_eq!(session.access_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn refresh_uses_the_configured_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"progress": 12, "status": "running"})))
        .mount(&server)
        .await;

    let session = Session::new(Some("stale".into()), Some("r-1".into()));
    let client = api(&server, session).with_refresh_path("/api/token/refresh/");

    let payload = client.get_progress(&job()).await.unwrap();
    assert_eq!(payload.progress, 12.0);
}

#[tokio::test]
async fn refused_refresh_means_the_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is invalid or expired"})))
        .mount(&server)
        .await;

    let session = Session::new(Some("stale".into()), Some("revoked".into()));
    let err = api(&server, session).get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::SessionExpired);
    assert!(err.is_session_loss());
}

#[tokio::test]
async fn still_unauthorized_after_refresh_means_the_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "fresh"})))
        .mount(&server)
        .await;

    let session = Session::new(Some("stale".into()), Some("r-1".into()));
    let err = api(&server, session).get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::SessionExpired);
}

#[tokio::test]
async fn unauthorized_without_refresh_token_is_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = api(&server, Session::anonymous()).get_progress(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::Unauthorized);
    assert!(!err.is_session_loss());
}

// ---------------------------------------------------------------------------
// Cancel endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_posts_to_the_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generation-jobs/job-123/cancel/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "cancelled"})))
        .expect(1)
        .mount(&server)
        .await;

    api(&server, Session::anonymous()).cancel_generation(&job()).await.unwrap();
}

#[tokio::test]
async fn cancel_refusal_carries_the_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generation-jobs/job-123/cancel/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Cannot cancel completed job"})))
        .mount(&server)
        .await;

    let err = api(&server, Session::anonymous()).cancel_generation(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::Rejected(ref m) if m == "Cannot cancel completed job");
    assert_eq!(err.to_string(), "Cannot cancel completed job");
}

#[tokio::test]
async fn cancel_failure_without_error_body_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generation-jobs/job-123/cancel/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = api(&server, Session::anonymous()).cancel_generation(&job()).await.unwrap_err();
    assert_matches!(err, TransportError::Api { status: 500, .. });
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tracker_follows_a_job_to_completion_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/job-123/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "progress": 100,
            "status": "completed",
            "message": "Timetable ready"
        })))
        .mount(&server)
        .await;

    let deps = TrackerDeps::new(
        Arc::new(api(&server, Session::anonymous())),
        Arc::new(MemoryCache::new()),
        PollerConfig {
            interval: Duration::from_millis(50),
            request_timeout: Duration::from_secs(2),
            max_not_found: 5,
        },
    );
    let recorder = Recorder::new();
    let tracker = GenerationTracker::mount(job(), deps, recorder.clone());

    tokio::time::timeout(Duration::from_secs(5), tracker.stopped())
        .await
        .expect("tracker should stop after completion");

    assert_eq!(recorder.count(&Event::Complete(job())), 1);
    assert_eq!(tracker.state().status, JobStatus::Completed);
    assert_eq!(tracker.state().phase_label, "Timetable ready");
}
