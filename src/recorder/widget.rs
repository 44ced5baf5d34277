use crate::config::Settings;
use crate::media::MediaKind;
use crate::placeholder::WidgetSpec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One recording slot on a question, fixed at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    /// Unique within the question; doubles as the filename stem
    pub name: String,
    pub kind: MediaKind,
    /// Hard ceiling on recording duration
    pub max_duration: Duration,
    /// Whether the pause control is offered
    pub allow_pausing: bool,
    /// Upload size cap in bytes; negative means unlimited
    pub max_upload_bytes: i64,
}

impl Widget {
    /// Build a widget from a parsed placeholder plus site settings. A
    /// requested duration above the kind's configured ceiling is clamped
    /// down to it.
    pub fn from_spec(spec: &WidgetSpec, settings: &Settings, allow_pausing: bool) -> Self {
        let ceiling = spec.kind.time_limit(settings);
        let max_duration = match spec.duration {
            Some(requested) => requested.min(ceiling),
            None => ceiling,
        };

        Self {
            name: spec.name.clone(),
            kind: spec.kind,
            max_duration,
            allow_pausing,
            max_upload_bytes: settings.upload.max_bytes,
        }
    }

    /// The default widget used when a question has no inline placeholders.
    pub fn single(kind: MediaKind, settings: &Settings, allow_pausing: bool) -> Self {
        let spec = WidgetSpec {
            name: "recording".to_string(),
            kind,
            duration: None,
        };
        Self::from_spec(&spec, settings, allow_pausing)
    }

    /// Upload size cap, or None when the site imposes no limit.
    pub fn size_limit(&self) -> Option<u64> {
        (self.max_upload_bytes >= 0).then_some(self.max_upload_bytes as u64)
    }

    /// Filename of the finalized recording for this widget.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.name, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_duration_clamped_to_ceiling() {
        let settings = Settings::default();
        let spec = WidgetSpec {
            name: "answer".to_string(),
            kind: MediaKind::Audio,
            duration: Some(Duration::from_secs(7200)),
        };

        let widget = Widget::from_spec(&spec, &settings, true);
        assert_eq!(
            widget.max_duration,
            Duration::from_secs(settings.audio.time_limit_secs)
        );
    }

    #[test]
    fn test_duration_below_ceiling_kept() {
        let settings = Settings::default();
        let spec = WidgetSpec {
            name: "answer".to_string(),
            kind: MediaKind::Video,
            duration: Some(Duration::from_secs(45)),
        };

        let widget = Widget::from_spec(&spec, &settings, false);
        assert_eq!(widget.max_duration, Duration::from_secs(45));
        assert!(!widget.allow_pausing);
    }

    #[test]
    fn test_omitted_duration_uses_ceiling() {
        let settings = Settings::default();
        let widget = Widget::single(MediaKind::Screen, &settings, true);

        assert_eq!(widget.name, "recording");
        assert_eq!(
            widget.max_duration,
            Duration::from_secs(settings.screen.time_limit_secs)
        );
    }

    #[test]
    fn test_size_limit_negative_means_unlimited() {
        let mut settings = Settings::default();
        settings.upload.max_bytes = -1;
        let unlimited = Widget::single(MediaKind::Audio, &settings, true);
        assert_eq!(unlimited.size_limit(), None);

        settings.upload.max_bytes = 5_000_000;
        let bounded = Widget::single(MediaKind::Audio, &settings, true);
        assert_eq!(bounded.size_limit(), Some(5_000_000));
    }

    #[test]
    fn test_file_name_uses_widget_name() {
        let settings = Settings::default();
        let widget = Widget::single(MediaKind::Audio, &settings, true);
        assert_eq!(widget.file_name("wav"), "recording.wav");
    }
}
