pub mod machine;
pub mod session;
pub mod status;
pub mod timer;
pub mod widget;

pub use machine::{Recorder, RecorderCommand, RecorderMachine, WidgetNotice};
pub use session::RecordingSession;
pub use status::{RecorderState, RecorderStatus, StatusLine};
pub use timer::{format_clock, CountdownTimer, TimerEvent};
pub use widget::Widget;
