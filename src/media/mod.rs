pub mod encoder;
pub mod gateway;
pub mod kind;

pub use encoder::{assemble_recording, ChunkEncoder, EncoderEvent, NegotiatedFormat, Recording};
pub use gateway::{
    CaptureDeviceGateway, CaptureError, LiveStream, ScriptedGateway, ScriptedGatewayConfig,
    StreamPayload, TrackDescriptor,
};
pub use kind::{Environment, EnvironmentError, MediaConstraints, MediaKind};
