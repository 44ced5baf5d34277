use super::kind::{MediaConstraints, MediaKind};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Why a capture device could not be acquired or kept alive.
/// Display strings are what the user sees in the failure alert.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum CaptureError {
    #[error("recording permission was denied; allow access in the browser and try again")]
    PermissionDenied,
    #[error("no suitable recording device was found")]
    DeviceMissing,
    #[error("the recording device stopped responding")]
    DeviceUnreadable,
    #[error("the recording device cannot satisfy the requested capture settings")]
    ConstraintsUnsatisfiable,
    #[error("recording requires a secure (https) connection")]
    InsecureContext,
    #[error("this browser cannot record {0} here")]
    Unsupported(MediaKind),
}

/// What the acquired track actually delivers
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    pub kind: MediaKind,
    /// Delivered audio sample rate in Hz
    pub sample_rate: u32,
    /// Delivered audio channel count
    pub channels: u16,
    /// Delivered frame dimensions for video/screen
    pub frame_size: Option<(u32, u32)>,
    /// MIME types the device-side recorder can encode to (probing input)
    pub supported_mime_types: Vec<String>,
}

/// One payload from a live stream
#[derive(Debug, Clone)]
pub enum StreamPayload {
    /// The stream is live; video/screen capture holds in preview until this
    Ready,
    /// Raw interleaved PCM samples from an audio track
    Audio(Vec<i16>),
    /// Device-encoded bytes from a video/screen track
    Video(Vec<u8>),
    /// The device ended the stream (unplugged, permission revoked)
    Ended,
}

/// An acquired capture stream: what it is, plus its payload feed
#[derive(Debug)]
pub struct LiveStream {
    pub descriptor: TrackDescriptor,
    pub payloads: mpsc::Receiver<StreamPayload>,
}

/// Capture device seam
///
/// The one place that talks to platform capture APIs. Host pages plug in a
/// real device gateway; tests and demos use [`ScriptedGateway`].
#[async_trait::async_trait]
pub trait CaptureDeviceGateway: Send + Sync {
    /// Acquire a live stream matching `constraints`.
    ///
    /// May stay pending indefinitely while the user decides on the
    /// permission prompt; there is no built-in timeout.
    async fn acquire(&mut self, constraints: &MediaConstraints)
        -> Result<LiveStream, CaptureError>;

    /// Release the device once capture is over.
    async fn release(&mut self);

    /// Gateway name for logging
    fn name(&self) -> &str;
}

/// Configuration for the scripted gateway
#[derive(Debug, Clone)]
pub struct ScriptedGatewayConfig {
    /// Interval between synthetic payloads
    pub cadence: Duration,
    /// Samples (audio) or bytes (video/screen) per payload
    pub burst_len: usize,
    /// Emit `Ended` after this many data payloads (a dying device)
    pub end_after: Option<usize>,
    /// Refuse every acquire with this reason
    pub deny: Option<CaptureError>,
    /// Simulated time until the user answers the permission prompt
    pub grant_delay: Duration,
    /// What the simulated device recorder claims to encode
    pub supported_mime_types: Vec<String>,
}

impl Default for ScriptedGatewayConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(20),
            burst_len: 960, // 20ms at 48kHz
            end_after: None,
            deny: None,
            grant_delay: Duration::ZERO,
            supported_mime_types: vec!["video/webm;codecs=vp9,opus".to_string()],
        }
    }
}

/// Deterministic synthetic capture source for tests and demos
pub struct ScriptedGateway {
    config: ScriptedGatewayConfig,
    feeder: Option<JoinHandle<()>>,
}

impl ScriptedGateway {
    pub fn new(config: ScriptedGatewayConfig) -> Self {
        Self {
            config,
            feeder: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureDeviceGateway for ScriptedGateway {
    async fn acquire(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<LiveStream, CaptureError> {
        if let Some(reason) = &self.config.deny {
            return Err(reason.clone());
        }

        // Simulate the permission prompt round trip
        if !self.config.grant_delay.is_zero() {
            tokio::time::sleep(self.config.grant_delay).await;
        }

        let descriptor = TrackDescriptor {
            kind: constraints.kind,
            sample_rate: constraints.sample_rate,
            channels: constraints.channels,
            frame_size: constraints.frame_size,
            supported_mime_types: self.config.supported_mime_types.clone(),
        };

        let (tx, rx) = mpsc::channel(64);
        let kind = constraints.kind;
        let cadence = self.config.cadence;
        let burst_len = self.config.burst_len;
        let end_after = self.config.end_after;

        let feeder = tokio::spawn(async move {
            if tx.send(StreamPayload::Ready).await.is_err() {
                return;
            }

            let mut ticker = tokio::time::interval(cadence);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut seq: usize = 0;

            loop {
                ticker.tick().await;

                if end_after.is_some_and(|limit| seq >= limit) {
                    let _ = tx.send(StreamPayload::Ended).await;
                    break;
                }

                let payload = match kind {
                    MediaKind::Audio => {
                        StreamPayload::Audio(vec![(seq % 100) as i16; burst_len])
                    }
                    MediaKind::Video | MediaKind::Screen => {
                        StreamPayload::Video(vec![(seq % 251) as u8; burst_len])
                    }
                };

                if tx.send(payload).await.is_err() {
                    break;
                }

                seq += 1;
            }
        });

        self.feeder = Some(feeder);

        Ok(LiveStream {
            descriptor,
            payloads: rx,
        })
    }

    async fn release(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            debug!("Scripted gateway released");
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
