use crate::media::CaptureError;
use serde::Serialize;
use thiserror::Error;

/// Page-level view published through the coordinator's watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageStatus {
    /// Whether the submit control should be enabled: at least one widget
    /// holds a saved answer and nothing is currently recording
    pub submit_enabled: bool,
    /// Widget holding the page lock while it records, if any
    pub recording_widget: Option<String>,
}

impl PageStatus {
    pub fn initial() -> Self {
        Self {
            submit_enabled: false,
            recording_widget: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.recording_widget.is_some()
    }
}

/// Alerts the host should surface modally, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QuestionAlert {
    /// A recorder could not get at its capture device, or lost it
    CaptureFailed { widget: String, reason: CaptureError },
    /// A recording approached the upload size cap and was stopped
    NearingSizeLimit { widget: String },
}

/// Why a widget control request was turned down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlRefused {
    #[error("no widget named '{0}' on this question")]
    UnknownWidget(String),
    /// Another widget holds the page lock
    #[error("another widget is recording")]
    PageBusy,
    /// The coordinator is already shutting down
    #[error("the question page is closing")]
    Gone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_page_is_unlocked_and_unsubmittable() {
        let status = PageStatus::initial();
        assert!(!status.submit_enabled);
        assert!(!status.is_locked());
    }

    #[test]
    fn test_refusals_render() {
        assert_eq!(
            ControlRefused::UnknownWidget("intro".to_string()).to_string(),
            "no widget named 'intro' on this question"
        );
        assert_eq!(
            ControlRefused::PageBusy.to_string(),
            "another widget is recording"
        );
    }
}
