// End-to-end demo: scripted capture -> countdown expiry -> upload
//
// Runs the whole pipeline against an in-process stub endpoint: a question
// with one 2-second audio widget records from a scripted gateway, stops on
// expiry, and uploads the finished WAV to a local server that answers the
// way the real draft-area endpoint does.

use anyhow::Result;
use axum::extract::Multipart;
use axum::routing::post;
use axum::{Json, Router};
use quiz_recorder::{
    Environment, GatewayFactory, QuestionCoordinator, QuestionDefinition, RecorderState,
    ScriptedGateway, ScriptedGatewayConfig, Settings, StatusLine, UploadDestination,
};
use std::time::Duration;
use tracing::info;

async fn accept_upload(mut multipart: Multipart) -> Json<serde_json::Value> {
    let mut stored = 0usize;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field.bytes().await.unwrap_or_default();
        if name == "repo_upload_file" {
            stored = bytes.len();
        }
    }
    info!("📥 Stub endpoint stored {} bytes", stored);
    Json(serde_json::json!({ "event": "fileuploaded" }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // 1. Stand in for the upload endpoint
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let router = Router::new().route("/upload", post(accept_upload));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    info!("✅ Stub endpoint listening on {}", address);

    // 2. One audio widget, 2 second limit, fast cadences for the demo
    let mut settings = Settings::default();
    settings.recorder.flush_interval_ms = 200;

    let definition = QuestionDefinition::custom("<p>Answer: [[answer:audio:2s]]</p>", true);
    let destination = UploadDestination {
        upload_url: format!("http://{}/upload", address),
        session_key: "demo-sesskey".to_string(),
        repository_id: 4,
        item_id: 99,
        context_id: 1,
    };

    let gateways: GatewayFactory =
        Box::new(|_| Box::new(ScriptedGateway::new(ScriptedGatewayConfig::default())));
    let mut coordinator = QuestionCoordinator::new(
        definition,
        settings,
        &Environment::default(),
        gateways,
        destination,
    )?;
    info!("✅ Question built: {:?}", coordinator.widget_names());

    let alerts = coordinator.take_alerts();

    // 3. Record: the countdown expires after 2s and stops on its own
    let mut status = coordinator
        .widget_status("answer")
        .expect("widget exists");
    coordinator.start("answer").await?;
    info!("🎙️  Recording started");

    loop {
        status.changed().await?;
        let snapshot = status.borrow().clone();
        if let Some(clock) = snapshot.clock() {
            info!("   {:?} ({})", snapshot.state, clock);
        }
        let done = matches!(snapshot.line, StatusLine::Saved | StatusLine::UploadFailed(_))
            || (snapshot.state == RecorderState::Recorded && !snapshot.has_recording);
        if done {
            info!("🏁 Final state: {:?}, line '{}'", snapshot.state, snapshot.line);
            break;
        }
    }

    // 4. Page-level outcome
    let page = coordinator.current_page();
    info!(
        "✅ Submit enabled: {}, locked by: {:?}",
        page.submit_enabled, page.recording_widget
    );

    if let Some(mut alerts) = alerts {
        while let Ok(alert) = alerts.try_recv() {
            info!("⚠️  Alert: {:?}", alert);
        }
    }

    coordinator.shutdown().await;
    info!("👋 Done");

    // Give the stub server a beat to log the stored size
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
