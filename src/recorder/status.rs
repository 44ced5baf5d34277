use super::timer::format_clock;
use crate::media::CaptureError;
use crate::upload::UploadError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle of one recorder widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    /// Nothing captured yet, ready to start
    New,
    /// Device acquisition or video preview in progress
    Starting,
    Recording,
    Paused,
    /// Stop requested, waiting for the final chunk flush
    Saving,
    /// A finished attempt exists (possibly empty)
    Recorded,
}

/// Fixed vocabulary of user-facing status lines. Hosts key localized
/// strings off the variant; `Display` is the untranslated fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatusLine {
    Idle,
    /// Waiting for the user to grant device access
    AwaitingPermission,
    /// Video preview is live; recording starts on the next press
    PreviewReady,
    Recording,
    Paused,
    Stopping,
    /// Recording finished and held locally
    Complete,
    PreparingUpload,
    Uploading { percent: u8 },
    Saved,
    UploadFailed(UploadError),
    CaptureFailed(CaptureError),
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::Idle => Ok(()),
            StatusLine::AwaitingPermission => write!(f, "waiting for permission"),
            StatusLine::PreviewReady => write!(f, "press record to begin"),
            StatusLine::Recording => write!(f, "recording"),
            StatusLine::Paused => write!(f, "paused"),
            StatusLine::Stopping => write!(f, "stopping"),
            StatusLine::Complete => write!(f, "recording complete"),
            StatusLine::PreparingUpload => write!(f, "preparing upload"),
            StatusLine::Uploading { percent } => write!(f, "uploading ({percent}%)"),
            StatusLine::Saved => write!(f, "saved"),
            StatusLine::UploadFailed(reason) => write!(f, "upload failed: {reason}"),
            StatusLine::CaptureFailed(reason) => write!(f, "{reason}"),
        }
    }
}

/// Snapshot published through the status watch channel after every
/// observable change.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStatus {
    pub state: RecorderState,
    pub line: StatusLine,
    /// Time left on the countdown; None before the first start
    pub remaining: Option<Duration>,
    /// Upload progress in 0.0..=1.0 while an upload runs
    pub progress: Option<f32>,
    /// Whether a non-empty finished recording is held locally
    pub has_recording: bool,
}

impl RecorderStatus {
    pub fn initial() -> Self {
        Self {
            state: RecorderState::New,
            line: StatusLine::Idle,
            remaining: None,
            progress: None,
            has_recording: false,
        }
    }

    /// The countdown rendered as m:ss, when one is live.
    pub fn clock(&self) -> Option<String> {
        self.remaining.map(format_clock)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            RecorderState::Starting
                | RecorderState::Recording
                | RecorderState::Paused
                | RecorderState::Saving
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines_render() {
        assert_eq!(StatusLine::Idle.to_string(), "");
        assert_eq!(
            StatusLine::Uploading { percent: 42 }.to_string(),
            "uploading (42%)"
        );
        assert_eq!(
            StatusLine::UploadFailed(UploadError::NotFound).to_string(),
            "upload failed: the upload endpoint was not found; the recording may be too large"
        );
    }

    #[test]
    fn test_initial_status_is_inactive() {
        let status = RecorderStatus::initial();
        assert_eq!(status.state, RecorderState::New);
        assert!(!status.is_active());
        assert!(!status.has_recording);
        assert_eq!(status.clock(), None);
    }

    #[test]
    fn test_clock_formats_remaining() {
        let status = RecorderStatus {
            remaining: Some(Duration::from_secs(95)),
            ..RecorderStatus::initial()
        };
        assert_eq!(status.clock().as_deref(), Some("1:35"));
    }
}
