// Chunk encoding for live capture streams
//
// The encoder sits between a live stream and the recorder state machine: it
// buffers incoming payloads and emits one encoded chunk per flush interval.
// Audio is compressed off the async runtime on a dedicated worker thread
// (decimation to the bitrate-implied sample rate); video and screen payloads
// arrive already encoded by the device recorder and pass through unchanged.

use super::gateway::{CaptureError, LiveStream, StreamPayload};
use super::kind::MediaKind;
use anyhow::{Context, Result};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the encoder reports back to its state machine
#[derive(Debug)]
pub enum EncoderEvent {
    /// One flushed chunk of encoded bytes
    Chunk(Vec<u8>),
    /// Final flush done; no more chunks will follow
    Stopped,
    /// The stream died mid-capture
    Failed(CaptureError),
}

#[derive(Debug)]
enum EncoderControl {
    Pause,
    Resume,
    Stop,
}

/// The output format settled at encoder construction time
#[derive(Debug, Clone)]
pub struct NegotiatedFormat {
    pub kind: MediaKind,
    /// MIME type the finalized blob will carry
    pub mime_type: &'static str,
    /// Filename extension (no leading dot)
    pub file_extension: &'static str,
    /// Effective PCM sample rate after compression (audio only)
    pub sample_rate: u32,
    pub channels: u16,
}

/// Handle to a running encoder task
pub struct ChunkEncoder {
    control: mpsc::Sender<EncoderControl>,
    task: JoinHandle<()>,
    format: NegotiatedFormat,
}

impl ChunkEncoder {
    /// Take over `stream` and start emitting chunks on `events`.
    pub fn spawn(
        stream: LiveStream,
        bitrate: u32,
        flush_interval: Duration,
        events: mpsc::Sender<EncoderEvent>,
    ) -> Self {
        let descriptor = stream.descriptor;
        let stride = compression_stride(descriptor.sample_rate, bitrate);

        let format = match descriptor.kind {
            MediaKind::Audio => NegotiatedFormat {
                kind: descriptor.kind,
                mime_type: descriptor.kind.container_mime(),
                file_extension: descriptor.kind.file_extension(),
                sample_rate: descriptor.sample_rate / stride as u32,
                channels: descriptor.channels,
            },
            MediaKind::Video | MediaKind::Screen => NegotiatedFormat {
                kind: descriptor.kind,
                mime_type: descriptor.kind.negotiate_mime(&descriptor.supported_mime_types),
                file_extension: descriptor.kind.file_extension(),
                sample_rate: descriptor.sample_rate,
                channels: descriptor.channels,
            },
        };

        info!(
            "Encoder starting: kind={} format={} flush={}ms",
            format.kind,
            format.mime_type,
            flush_interval.as_millis()
        );

        let compressor = match descriptor.kind {
            MediaKind::Audio => Some(AudioCompressor::start(stride)),
            MediaKind::Video | MediaKind::Screen => None,
        };

        let (control_tx, control_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(
            stream.payloads,
            control_rx,
            compressor,
            flush_interval,
            events,
        ));

        Self {
            control: control_tx,
            task,
            format,
        }
    }

    pub fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    /// Discard payloads until resumed. Data already buffered still flushes.
    pub async fn pause(&self) {
        let _ = self.control.send(EncoderControl::Pause).await;
    }

    pub async fn resume(&self) {
        let _ = self.control.send(EncoderControl::Resume).await;
    }

    /// Request the final flush. The encoder answers with `EncoderEvent::Stopped`.
    pub async fn stop(&self) {
        let _ = self.control.send(EncoderControl::Stop).await;
    }

    /// Hard-kill the encoder task without a final flush.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run(
    mut payloads: mpsc::Receiver<StreamPayload>,
    mut control: mpsc::Receiver<EncoderControl>,
    compressor: Option<AudioCompressor>,
    flush_interval: Duration,
    events: mpsc::Sender<EncoderEvent>,
) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut paused = false;
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so the first
    // chunk covers a full window
    ticker.tick().await;

    loop {
        tokio::select! {
            payload = payloads.recv() => {
                match payload {
                    Some(StreamPayload::Ready) => {}
                    Some(StreamPayload::Audio(samples)) => {
                        if paused {
                            continue;
                        }
                        match &compressor {
                            Some(compressor) => match compressor.compress(samples).await {
                                Some(bytes) => buffer.extend_from_slice(&bytes),
                                None => {
                                    error!("Audio compression worker died");
                                    let _ = events
                                        .send(EncoderEvent::Failed(CaptureError::DeviceUnreadable))
                                        .await;
                                    return;
                                }
                            },
                            None => {
                                warn!("Dropping audio payload on a video stream");
                            }
                        }
                    }
                    Some(StreamPayload::Video(bytes)) => {
                        if paused {
                            continue;
                        }
                        if compressor.is_some() {
                            warn!("Dropping video payload on an audio stream");
                            continue;
                        }
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(StreamPayload::Ended) | None => {
                        info!("Capture stream ended before stop was requested");
                        let _ = events
                            .send(EncoderEvent::Failed(CaptureError::DeviceUnreadable))
                            .await;
                        return;
                    }
                }
            }

            cmd = control.recv() => {
                match cmd {
                    Some(EncoderControl::Pause) => {
                        debug!("Encoder paused");
                        paused = true;
                    }
                    Some(EncoderControl::Resume) => {
                        debug!("Encoder resumed");
                        paused = false;
                    }
                    Some(EncoderControl::Stop) | None => {
                        if !buffer.is_empty() {
                            let _ = events.send(EncoderEvent::Chunk(std::mem::take(&mut buffer))).await;
                        }
                        let _ = events.send(EncoderEvent::Stopped).await;
                        info!("Encoder stopped");
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    let chunk = std::mem::take(&mut buffer);
                    debug!("Flushing chunk: {} bytes", chunk.len());
                    if events.send(EncoderEvent::Chunk(chunk)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// A finalized recording, ready to upload
#[derive(Debug, Clone)]
pub struct Recording {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

/// Assemble the finalized recording from flushed chunks.
///
/// Audio chunks are raw 16-bit little-endian PCM and get wrapped in a WAV
/// container; video/screen chunks are container fragments and concatenate
/// byte for byte in capture order.
pub fn assemble_recording(chunks: &[Vec<u8>], format: &NegotiatedFormat) -> Result<Vec<u8>> {
    match format.kind {
        MediaKind::Audio => {
            let spec = hound::WavSpec {
                channels: format.channels,
                sample_rate: format.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };

            let mut cursor = Cursor::new(Vec::new());
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to start WAV container")?;

            for chunk in chunks {
                for pair in chunk.chunks_exact(2) {
                    let sample = i16::from_le_bytes([pair[0], pair[1]]);
                    writer
                        .write_sample(sample)
                        .context("Failed to write sample to WAV")?;
                }
            }

            writer.finalize().context("Failed to finalize WAV container")?;
            Ok(cursor.into_inner())
        }
        MediaKind::Video | MediaKind::Screen => Ok(chunks.concat()),
    }
}

/// Decimation stride implied by the target bitrate (16-bit PCM).
fn compression_stride(sample_rate: u32, bitrate: u32) -> usize {
    let target_rate = (bitrate / 16).max(1);
    (sample_rate / target_rate).max(1) as usize
}

struct CompressJob {
    samples: Vec<i16>,
    reply: oneshot::Sender<Vec<u8>>,
}

/// Off-runtime audio compression. The worker thread owns nothing shared:
/// samples go in over a channel, compressed bytes come back per job.
struct AudioCompressor {
    jobs: std::sync::mpsc::Sender<CompressJob>,
}

impl AudioCompressor {
    fn start(stride: usize) -> Self {
        let (jobs_tx, jobs_rx) = std::sync::mpsc::channel::<CompressJob>();

        // Exits when the job sender is dropped
        std::thread::spawn(move || {
            while let Ok(job) = jobs_rx.recv() {
                let bytes = decimate_to_bytes(&job.samples, stride);
                let _ = job.reply.send(bytes);
            }
        });

        Self { jobs: jobs_tx }
    }

    async fn compress(&self, samples: Vec<i16>) -> Option<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(CompressJob {
                samples,
                reply: reply_tx,
            })
            .ok()?;
        reply_rx.await.ok()
    }
}

/// Decimate to every Nth sample, then serialize as little-endian PCM.
fn decimate_to_bytes(samples: &[i16], stride: usize) -> Vec<u8> {
    samples
        .iter()
        .step_by(stride.max(1))
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_stride_from_bitrate() {
        // 128 kbps at 16 bits/sample implies 8 kHz; 48 kHz capture -> stride 6
        assert_eq!(compression_stride(48000, 128_000), 6);
        // Bitrate at or above the raw rate: no compression
        assert_eq!(compression_stride(48000, 768_000), 1);
        assert_eq!(compression_stride(48000, 10_000_000), 1);
    }

    #[test]
    fn test_decimate_to_bytes() {
        let samples: Vec<i16> = vec![10, 20, 30, 40, 50, 60];
        let bytes = decimate_to_bytes(&samples, 2);

        // Every 2nd sample: 10, 30, 50
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 10);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 30);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 50);
    }

    #[test]
    fn test_assemble_audio_recording_is_readable_wav() {
        let format = NegotiatedFormat {
            kind: MediaKind::Audio,
            mime_type: "audio/wav",
            file_extension: "wav",
            sample_rate: 8000,
            channels: 1,
        };

        let chunks = vec![
            decimate_to_bytes(&[1, 2, 3, 4], 1),
            decimate_to_bytes(&[5, 6], 1),
        ];

        let blob = assemble_recording(&chunks, &format).unwrap();

        let reader = hound::WavReader::new(Cursor::new(blob)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_assemble_video_recording_concatenates() {
        let format = NegotiatedFormat {
            kind: MediaKind::Video,
            mime_type: "video/webm",
            file_extension: "webm",
            sample_rate: 48000,
            channels: 1,
        };

        let chunks = vec![vec![1u8, 2, 3], vec![4u8, 5], vec![6u8]];
        let blob = assemble_recording(&chunks, &format).unwrap();
        assert_eq!(blob, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_assemble_empty_chunks() {
        let format = NegotiatedFormat {
            kind: MediaKind::Screen,
            mime_type: "video/webm",
            file_extension: "webm",
            sample_rate: 48000,
            channels: 1,
        };

        assert!(assemble_recording(&[], &format).unwrap().is_empty());
    }
}
