pub mod client;
pub mod outcome;

pub use client::{UploadClient, UploadDestination, UploadEvent, UPLOAD_SLICE_BYTES};
pub use outcome::{classify_response, UploadError, UploadOutcome};
