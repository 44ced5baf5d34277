// Integration tests for the upload pipeline
//
// Each test stands up an in-process stub of the draft-area upload endpoint,
// including its habit of reporting failures inside HTTP 200 bodies, and
// drives one upload through the client. The stub logs every multipart field
// it receives so the form contract can be checked byte for byte.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use quiz_recorder::{
    Recording, UploadClient, UploadDestination, UploadError, UploadEvent, UploadOutcome,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

type FieldLog = Arc<Mutex<HashMap<String, Vec<u8>>>>;

async fn log_fields(log: &FieldLog, mut multipart: Multipart) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field.bytes().await.unwrap_or_default().to_vec();
        log.lock().unwrap().insert(name, bytes);
    }
}

/// Serve `router` on an ephemeral port and return the upload URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub endpoint");
    let address = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}/upload", address)
}

fn destination(upload_url: String) -> UploadDestination {
    UploadDestination {
        upload_url,
        session_key: "abc123".to_string(),
        repository_id: 4,
        item_id: 7070,
        context_id: 21,
    }
}

fn recording(len: usize) -> Recording {
    Recording {
        data: (0..len).map(|i| (i % 251) as u8).collect(),
        mime_type: "audio/wav".to_string(),
        file_name: "answer.wav".to_string(),
    }
}

/// Run one upload to completion, collecting progress fractions and the
/// terminal outcome. The event stream must end with `Finished`.
async fn run_upload(upload_url: String, blob: Recording) -> (Vec<f32>, UploadOutcome) {
    let client = UploadClient::new().expect("http client");
    let dest = destination(upload_url);
    let (events_tx, mut events_rx) = mpsc::channel(32);

    let task = tokio::spawn(async move {
        client.upload(blob, &dest, events_tx).await;
    });

    let mut fractions = Vec::new();
    let mut outcome = None;
    while let Some(event) = timeout(Duration::from_secs(5), events_rx.recv())
        .await
        .expect("timed out waiting for upload events")
    {
        match event {
            UploadEvent::Progress(fraction) => {
                assert!(
                    outcome.is_none(),
                    "no progress may follow the terminal outcome"
                );
                fractions.push(fraction);
            }
            UploadEvent::Finished(result) => outcome = Some(result),
        }
    }
    task.await.expect("upload task panicked");

    (fractions, outcome.expect("upload finished without an outcome"))
}

#[tokio::test]
async fn test_successful_upload_carries_the_contract_form() {
    let log: FieldLog = Arc::new(Mutex::new(HashMap::new()));
    let router = Router::new()
        .route(
            "/upload",
            post(|State(log): State<FieldLog>, multipart: Multipart| async move {
                log_fields(&log, multipart).await;
                Json(serde_json::json!({ "event": "fileuploaded" }))
            }),
        )
        .with_state(Arc::clone(&log));
    let url = serve(router).await;

    let blob = recording(4096);
    let expected_bytes = blob.data.clone();
    let (_, outcome) = run_upload(url, blob).await;
    assert_eq!(outcome, UploadOutcome::Saved);

    let fields = log.lock().unwrap().clone();
    assert_eq!(fields["repo_upload_file"], expected_bytes);
    assert_eq!(fields["sesskey"], b"abc123");
    assert_eq!(fields["repo_id"], b"4");
    assert_eq!(fields["itemid"], b"7070");
    assert_eq!(fields["savepath"], b"/");
    assert_eq!(fields["ctx_id"], b"21");
    assert_eq!(fields["overwrite"], b"1");
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_one() {
    let router = Router::new().route(
        "/upload",
        post(|_multipart: Multipart| async { Json(serde_json::json!({})) }),
    );
    let url = serve(router).await;

    // Several 64 KiB slices worth of data, so progress updates more than once
    let (fractions, outcome) = run_upload(url, recording(200_000)).await;
    assert_eq!(outcome, UploadOutcome::Saved);

    assert!(fractions.len() >= 2, "expected multiple progress updates");
    for pair in fractions.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {:?}", pair);
    }
    assert_eq!(*fractions.last().unwrap(), 1.0);
}

#[tokio::test]
async fn test_http_200_with_errorcode_is_a_failure() {
    let router = Router::new().route(
        "/upload",
        post(|_multipart: Multipart| async {
            Json(serde_json::json!({ "errorcode": "maxbytes", "error": "File too large" }))
        }),
    );
    let url = serve(router).await;

    let (_, outcome) = run_upload(url, recording(1024)).await;
    assert_eq!(
        outcome,
        UploadOutcome::Failed(UploadError::Server {
            code: "maxbytes".to_string()
        })
    );
}

#[tokio::test]
async fn test_missing_endpoint_maps_to_not_found() {
    // A live server with no /upload route answers 404, the endpoint's way
    // of turning away oversized posts
    let router = Router::new().route(
        "/elsewhere",
        post(|| async { Json(serde_json::json!({})) }),
    );
    let url = serve(router).await;

    let (_, outcome) = run_upload(url, recording(1024)).await;
    assert_eq!(outcome, UploadOutcome::Failed(UploadError::NotFound));
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let router = Router::new().route(
        "/upload",
        post(|_multipart: Multipart| async {
            let response: Response = (StatusCode::OK, "<html>session expired</html>").into_response();
            response
        }),
    );
    let url = serve(router).await;

    let (_, outcome) = run_upload(url, recording(1024)).await;
    assert_eq!(outcome, UploadOutcome::Failed(UploadError::Malformed));
}

#[tokio::test]
async fn test_other_http_errors_keep_their_status() {
    let router = Router::new().route(
        "/upload",
        post(|_multipart: Multipart| async {
            let response: Response = (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
            response
        }),
    );
    let url = serve(router).await;

    let (_, outcome) = run_upload(url, recording(1024)).await;
    assert_eq!(
        outcome,
        UploadOutcome::Failed(UploadError::Http { status: 500 })
    );
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_transport_failure() {
    // Nothing listens on this port; the request cannot leave the machine
    let url = "http://127.0.0.1:9/upload".to_string();

    let (_, outcome) = run_upload(url, recording(1024)).await;
    assert_eq!(outcome, UploadOutcome::Failed(UploadError::Transport));
}
