use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Unbounded upload size sentinel (mirrors the site setting).
pub const UNLIMITED_UPLOAD_BYTES: i64 = -1;

/// Site-level recorder settings, loaded once per question render.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub video: VideoSettings,
    #[serde(default)]
    pub screen: ScreenSettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub recorder: RecorderSettings,
}

/// Raw capture format requested from the device layer
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    /// Sample rate delivered by the capture device (Hz)
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    /// Target audio bitrate in bits per second
    pub bitrate: u32,
    /// Maximum recording duration in seconds
    pub time_limit_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSettings {
    /// Target video bitrate in bits per second
    pub bitrate: u32,
    /// Maximum recording duration in seconds
    pub time_limit_secs: u64,
    /// Capture frame width in pixels
    pub width: u32,
    /// Capture frame height in pixels
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenSettings {
    /// Target screen-capture bitrate in bits per second
    pub bitrate: u32,
    /// Maximum recording duration in seconds
    pub time_limit_secs: u64,
    /// Capture frame width in pixels
    pub width: u32,
    /// Capture frame height in pixels
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    /// Maximum accepted upload size in bytes (-1 = unlimited)
    pub max_bytes: i64,
}

/// Internal cadences; tests shrink these to run fast
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderSettings {
    /// Countdown display refresh interval in milliseconds
    pub tick_interval_ms: u64,
    /// Encoder flush interval in milliseconds (one chunk per flush)
    pub flush_interval_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000, // Typical device capture rate
            channels: 1,        // Mono
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            bitrate: 128_000,
            time_limit_secs: 600, // 10 minutes
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            bitrate: 2_500_000,
            time_limit_secs: 300, // 5 minutes
            width: 640,
            height: 480,
        }
    }
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            bitrate: 2_500_000,
            time_limit_secs: 300, // 5 minutes
            width: 1280,
            height: 720,
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: UNLIMITED_UPLOAD_BYTES,
        }
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,   // Display-only refresh
            flush_interval_ms: 1000, // One chunk per second
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            audio: AudioSettings::default(),
            video: VideoSettings::default(),
            screen: ScreenSettings::default(),
            upload: UploadSettings::default(),
            recorder: RecorderSettings::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.recorder.tick_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.recorder.flush_interval_ms)
    }
}
