use crate::config::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What a widget records. Everything that differs between the three kinds
/// (codec, container, constraints, limits) is answered here, so the state
/// machine itself never branches on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Screen,
}

impl MediaKind {
    /// Parse a placeholder type tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "screen" => Some(Self::Screen),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Screen => "screen",
        }
    }

    pub fn has_video(&self) -> bool {
        !matches!(self, Self::Audio)
    }

    /// MIME type of the finalized recording.
    pub fn container_mime(&self) -> &'static str {
        match self {
            Self::Audio => "audio/wav",
            Self::Video | Self::Screen => "video/webm",
        }
    }

    /// File extension of the finalized recording (no leading dot).
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Audio => "wav",
            Self::Video | Self::Screen => "webm",
        }
    }

    /// Codec strings to probe the device recorder with, best first.
    /// Audio is compressed in-process, so nothing to probe.
    pub fn codec_preferences(&self) -> &'static [&'static str] {
        match self {
            Self::Audio => &[],
            Self::Video | Self::Screen => &[
                "video/webm;codecs=vp9,opus",
                "video/webm;codecs=vp8,opus",
                "video/webm",
            ],
        }
    }

    /// Pick the recording MIME type from what the device recorder supports.
    /// Falls back to the plain container when nothing on the list matches.
    pub fn negotiate_mime(&self, supported: &[String]) -> &'static str {
        self.codec_preferences()
            .iter()
            .find(|candidate| supported.iter().any(|s| s == *candidate))
            .copied()
            .unwrap_or_else(|| self.container_mime())
    }

    pub fn bitrate(&self, settings: &Settings) -> u32 {
        match self {
            Self::Audio => settings.audio.bitrate,
            Self::Video => settings.video.bitrate,
            Self::Screen => settings.screen.bitrate,
        }
    }

    /// The configured duration ceiling for this kind.
    pub fn time_limit(&self, settings: &Settings) -> Duration {
        let secs = match self {
            Self::Audio => settings.audio.time_limit_secs,
            Self::Video => settings.video.time_limit_secs,
            Self::Screen => settings.screen.time_limit_secs,
        };
        Duration::from_secs(secs)
    }

    /// Capture frame dimensions; None for audio.
    pub fn frame_size(&self, settings: &Settings) -> Option<(u32, u32)> {
        match self {
            Self::Audio => None,
            Self::Video => Some((settings.video.width, settings.video.height)),
            Self::Screen => Some((settings.screen.width, settings.screen.height)),
        }
    }

    /// Build the device constraints for this kind from site settings.
    pub fn constraints(&self, settings: &Settings) -> MediaConstraints {
        MediaConstraints {
            kind: *self,
            sample_rate: settings.capture.sample_rate,
            channels: settings.capture.channels,
            bitrate: self.bitrate(settings),
            frame_size: self.frame_size(settings),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What the capture layer is asked to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub kind: MediaKind,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Audio channel count
    pub channels: u16,
    /// Target encoded bitrate in bits per second
    pub bitrate: u32,
    /// Frame dimensions for video/screen capture
    pub frame_size: Option<(u32, u32)>,
}

/// What the host runtime reports about itself before any recorder is built.
/// Both checks must pass or the question renders a static warning instead
/// of recorder widgets.
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    /// The runtime exposes a media-capture capability
    pub media_capture: bool,
    /// The page is served from a secure context
    pub secure_context: bool,
}

impl Environment {
    pub fn verify(&self) -> Result<(), EnvironmentError> {
        if !self.media_capture {
            return Err(EnvironmentError::NoMediaCapture);
        }
        if !self.secure_context {
            return Err(EnvironmentError::InsecureContext);
        }
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            media_capture: true,
            secure_context: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    #[error("this browser does not support recording; try a recent browser version")]
    NoMediaCapture,
    #[error("recording requires a secure (https) connection")]
    InsecureContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in [MediaKind::Audio, MediaKind::Video, MediaKind::Screen] {
            assert_eq!(MediaKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(MediaKind::from_tag("podcast"), None);
    }

    #[test]
    fn test_negotiate_mime_prefers_list_order() {
        let supported = vec![
            "video/webm".to_string(),
            "video/webm;codecs=vp8,opus".to_string(),
        ];
        assert_eq!(
            MediaKind::Video.negotiate_mime(&supported),
            "video/webm;codecs=vp8,opus"
        );
    }

    #[test]
    fn test_negotiate_mime_falls_back_to_container() {
        assert_eq!(MediaKind::Screen.negotiate_mime(&[]), "video/webm");
        assert_eq!(MediaKind::Audio.negotiate_mime(&[]), "audio/wav");
    }

    #[test]
    fn test_constraints_follow_settings() {
        let settings = Settings::default();

        let audio = MediaKind::Audio.constraints(&settings);
        assert_eq!(audio.bitrate, settings.audio.bitrate);
        assert_eq!(audio.frame_size, None);

        let screen = MediaKind::Screen.constraints(&settings);
        assert_eq!(
            screen.frame_size,
            Some((settings.screen.width, settings.screen.height))
        );
    }

    #[test]
    fn test_environment_gate() {
        assert!(Environment::default().verify().is_ok());

        let no_capture = Environment {
            media_capture: false,
            secure_context: true,
        };
        assert_eq!(
            no_capture.verify(),
            Err(EnvironmentError::NoMediaCapture)
        );

        let insecure = Environment {
            media_capture: true,
            secure_context: false,
        };
        assert_eq!(insecure.verify(), Err(EnvironmentError::InsecureContext));
    }
}
