pub mod config;
pub mod media;
pub mod placeholder;
pub mod question;
pub mod recorder;
pub mod upload;

pub use config::Settings;
pub use media::{
    assemble_recording, CaptureDeviceGateway, CaptureError, ChunkEncoder, EncoderEvent,
    Environment, EnvironmentError, LiveStream, MediaConstraints, MediaKind, NegotiatedFormat,
    Recording, ScriptedGateway, ScriptedGatewayConfig, StreamPayload, TrackDescriptor,
};
pub use placeholder::{PlaceholderError, PlaceholderScanner, WidgetSpec};
pub use question::{
    ControlRefused, GatewayFactory, PageStatus, QuestionAlert, QuestionCoordinator,
    QuestionDefinition, QuestionError, QuestionLayout, WidgetControl,
};
pub use recorder::{
    format_clock, CountdownTimer, Recorder, RecorderCommand, RecorderMachine, RecorderState,
    RecorderStatus, RecordingSession, StatusLine, TimerEvent, Widget, WidgetNotice,
};
pub use upload::{
    classify_response, UploadClient, UploadDestination, UploadError, UploadEvent, UploadOutcome,
};
