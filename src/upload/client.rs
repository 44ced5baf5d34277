// Draft-area upload over multipart HTTP
//
// The recording travels as the `repo_upload_file` part of a multipart form,
// streamed in fixed slices so progress can be reported while the transfer
// runs. The terminal outcome is always the last event on the channel.

use super::outcome::{classify_response, UploadError, UploadOutcome};
use crate::media::Recording;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Slice size for the streamed body
pub const UPLOAD_SLICE_BYTES: usize = 64 * 1024;

/// Where uploads go: the draft-file endpoint plus the form fields that
/// authorize writing into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDestination {
    /// Full URL of the upload endpoint
    pub upload_url: String,
    /// Session key the endpoint checks alongside the cookie
    pub session_key: String,
    /// Id of the upload repository instance
    pub repository_id: u32,
    /// Draft item id receiving the file
    pub item_id: u64,
    /// Context id the upload happens in
    pub context_id: u64,
}

/// Events from one upload attempt
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Fraction of the blob handed to the transport, in 0.0..=1.0
    Progress(f32),
    /// Always the final event of an attempt
    Finished(UploadOutcome),
}

pub struct UploadClient {
    http: reqwest::Client,
}

impl UploadClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }

    /// Send `recording` to the draft area, reporting progress as slices go
    /// out. Finishes with `UploadEvent::Finished` whatever happens.
    pub async fn upload(
        &self,
        recording: Recording,
        destination: &UploadDestination,
        events: mpsc::Sender<UploadEvent>,
    ) {
        let outcome = self.try_upload(recording, destination, &events).await;

        match &outcome {
            UploadOutcome::Saved => info!("Upload accepted"),
            UploadOutcome::Failed(reason) => warn!("Upload failed: {}", reason),
        }

        let _ = events.send(UploadEvent::Finished(outcome)).await;
    }

    async fn try_upload(
        &self,
        recording: Recording,
        destination: &UploadDestination,
        events: &mpsc::Sender<UploadEvent>,
    ) -> UploadOutcome {
        let total = recording.data.len();
        info!(
            "Uploading '{}' ({} bytes, {}) to {}",
            recording.file_name, total, recording.mime_type, destination.upload_url
        );

        let progress = events.clone();
        let slices = futures::stream::unfold(
            (recording.data, 0usize),
            move |(data, offset)| {
                let progress = progress.clone();
                async move {
                    if offset >= data.len() {
                        return None;
                    }
                    let end = (offset + UPLOAD_SLICE_BYTES).min(data.len());
                    let slice = data[offset..end].to_vec();
                    let fraction = end as f32 / data.len() as f32;
                    let _ = progress.send(UploadEvent::Progress(fraction)).await;
                    Some((Ok::<_, Infallible>(slice), (data, end)))
                }
            },
        );

        let file_part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(slices),
            total as u64,
        )
        .file_name(recording.file_name.clone());

        let file_part = match file_part.mime_str(&recording.mime_type) {
            Ok(part) => part,
            Err(e) => {
                error!("Rejecting upload with malformed MIME type '{}': {}", recording.mime_type, e);
                return UploadOutcome::Failed(UploadError::Transport);
            }
        };

        let form = reqwest::multipart::Form::new()
            .part("repo_upload_file", file_part)
            .text("sesskey", destination.session_key.clone())
            .text("repo_id", destination.repository_id.to_string())
            .text("itemid", destination.item_id.to_string())
            .text("savepath", "/")
            .text("ctx_id", destination.context_id.to_string())
            .text("overwrite", "1");

        let response = match self
            .http
            .post(&destination.upload_url)
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Upload transport failure: {}", e);
                return UploadOutcome::Failed(UploadError::Transport);
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read upload response: {}", e);
                return UploadOutcome::Failed(UploadError::Transport);
            }
        };

        classify_response(status, &body)
    }
}
