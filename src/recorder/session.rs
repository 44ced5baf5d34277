use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One capture attempt. Created on start, replaced wholesale on re-record,
/// consumed by finalization. Owned exclusively by the recorder machine.
#[derive(Debug)]
pub struct RecordingSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Flushed chunks in arrival order
    pub chunks: Vec<Vec<u8>>,
    pub bytes_accumulated: u64,
    /// Whether the size-limit warning already fired for this attempt
    pub size_warned: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            chunks: Vec::new(),
            bytes_accumulated: 0,
            size_warned: false,
        }
    }

    /// Append a flushed chunk. Chunks are kept in arrival order, which is
    /// capture order because the encoder is the only producer.
    pub fn append_chunk(&mut self, chunk: Vec<u8>) {
        self.bytes_accumulated += chunk.len() as u64;
        self.chunks.push(chunk);
    }

    /// Whether accumulated bytes have reached `limit`. The check runs after
    /// append, so one overshooting chunk is kept rather than truncated.
    pub fn reached_size_limit(&self, limit: u64) -> bool {
        self.bytes_accumulated >= limit
    }

    pub fn elapsed_secs(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}
