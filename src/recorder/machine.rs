// Recorder state machine
//
// Each widget gets one machine task owning its capture gateway, encoder,
// countdown and upload attempt. Commands arrive on an mpsc channel, status
// snapshots leave through a watch channel, and page-level notices go to the
// question coordinator. All session state lives inside the task; the select
// loop only resolves inputs, every decision happens in the handlers below.

use super::session::RecordingSession;
use super::status::{RecorderState, RecorderStatus, StatusLine};
use super::timer::{CountdownTimer, TimerEvent};
use super::widget::Widget;
use crate::config::Settings;
use crate::media::{
    assemble_recording, CaptureDeviceGateway, CaptureError, ChunkEncoder, EncoderEvent,
    LiveStream, NegotiatedFormat, Recording, StreamPayload,
};
use crate::upload::{UploadClient, UploadDestination, UploadError, UploadEvent, UploadOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long page teardown waits for a machine to exit on its own before
/// aborting it. Covers the case of a permission prompt that never resolves.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Commands a machine accepts. Commands invalid for the current state are
/// ignored, never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    /// From `New`/`Recorded`: begin a fresh attempt. For video and screen
    /// the first start only brings up the preview; a second start begins
    /// capture. From `Starting`: begin capture.
    Start,
    Pause,
    Resume,
    Stop,
    /// Send the held recording to the upload endpoint
    Upload,
    /// Release everything and exit the machine task
    Teardown,
}

/// What machines report to the question coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetNotice {
    /// Capture began; the page should lock other controls
    Started { widget: String },
    /// The device could not be acquired or died mid-capture
    CaptureFailed { widget: String, reason: CaptureError },
    /// The attempt reached the upload size cap and is being stopped
    NearingSizeLimit { widget: String },
    /// The attempt finished; `has_recording` is false for an empty capture
    Stopped { widget: String, has_recording: bool },
    /// The upload reached a terminal outcome
    UploadFinished { widget: String, accepted: bool },
}

/// A resolved select arm. Arms only wrap what arrived; dispatch happens
/// after the select returns so handlers can borrow the whole machine.
enum Input {
    Command(Option<RecorderCommand>),
    Preview(Option<StreamPayload>),
    Encoder(Option<EncoderEvent>),
    Timer(Option<TimerEvent>),
    Upload(Option<UploadEvent>),
}

/// Receive from an optional channel; absent channels never resolve.
async fn recv_or_pending<T>(rx: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct RecorderMachine {
    widget: Widget,
    settings: Settings,
    gateway: Box<dyn CaptureDeviceGateway>,
    uploader: Arc<UploadClient>,
    destination: Arc<UploadDestination>,
    notices: mpsc::Sender<WidgetNotice>,
    status: watch::Sender<RecorderStatus>,

    state: RecorderState,
    line: StatusLine,
    progress: Option<f32>,

    /// Current capture attempt; replaced wholesale on re-record
    session: Option<RecordingSession>,
    /// Live stream held during video preview, before capture begins
    stream: Option<LiveStream>,
    encoder: Option<ChunkEncoder>,
    encoder_rx: Option<mpsc::Receiver<EncoderEvent>>,
    timer: Option<CountdownTimer>,
    timer_rx: Option<mpsc::Receiver<TimerEvent>>,
    /// Finished recording of the last attempt, if it captured anything
    recording: Option<Recording>,
    upload_rx: Option<mpsc::Receiver<UploadEvent>>,
    upload_task: Option<JoinHandle<()>>,
}

impl RecorderMachine {
    /// Spawn the machine task and return the host-facing handle.
    pub fn spawn(
        widget: Widget,
        settings: Settings,
        gateway: Box<dyn CaptureDeviceGateway>,
        uploader: Arc<UploadClient>,
        destination: Arc<UploadDestination>,
        notices: mpsc::Sender<WidgetNotice>,
    ) -> Recorder {
        let (status_tx, status_rx) = watch::channel(RecorderStatus::initial());
        let (command_tx, command_rx) = mpsc::channel(16);

        let machine = Self {
            widget: widget.clone(),
            settings,
            gateway,
            uploader,
            destination,
            notices,
            status: status_tx,
            state: RecorderState::New,
            line: StatusLine::Idle,
            progress: None,
            session: None,
            stream: None,
            encoder: None,
            encoder_rx: None,
            timer: None,
            timer_rx: None,
            recording: None,
            upload_rx: None,
            upload_task: None,
        };

        let task = tokio::spawn(machine.run(command_rx));

        Recorder {
            widget,
            commands: command_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<RecorderCommand>) {
        info!(
            "Recorder '{}' ready ({}, limit {}s)",
            self.widget.name,
            self.widget.kind,
            self.widget.max_duration.as_secs()
        );

        loop {
            let input = tokio::select! {
                command = commands.recv() => Input::Command(command),
                payload = recv_or_pending(self.stream.as_mut().map(|s| &mut s.payloads)) => {
                    Input::Preview(payload)
                }
                event = recv_or_pending(self.encoder_rx.as_mut()) => Input::Encoder(event),
                event = recv_or_pending(self.timer_rx.as_mut()) => Input::Timer(event),
                event = recv_or_pending(self.upload_rx.as_mut()) => Input::Upload(event),
            };

            match input {
                Input::Command(Some(RecorderCommand::Teardown)) | Input::Command(None) => {
                    self.teardown().await;
                    return;
                }
                Input::Command(Some(command)) => self.handle_command(command).await,
                Input::Preview(Some(payload)) => self.handle_preview(payload).await,
                Input::Preview(None) => self.handle_preview(StreamPayload::Ended).await,
                Input::Encoder(Some(event)) => self.handle_encoder_event(event).await,
                Input::Encoder(None) => self.encoder_rx = None,
                Input::Timer(Some(event)) => self.handle_timer_event(event).await,
                Input::Timer(None) => self.timer_rx = None,
                Input::Upload(Some(event)) => self.handle_upload_event(event).await,
                Input::Upload(None) => self.upload_rx = None,
            }
        }
    }

    async fn handle_command(&mut self, command: RecorderCommand) {
        match command {
            RecorderCommand::Start => self.handle_start().await,
            RecorderCommand::Pause => self.handle_pause().await,
            RecorderCommand::Resume => self.handle_resume().await,
            RecorderCommand::Stop => self.request_stop().await,
            RecorderCommand::Upload => self.handle_upload().await,
            // Intercepted in run() before dispatch
            RecorderCommand::Teardown => {}
        }
    }

    async fn handle_start(&mut self) {
        match self.state {
            RecorderState::New | RecorderState::Recorded => {
                if self.upload_task.is_some() {
                    debug!(
                        "Recorder '{}': start refused, upload in flight",
                        self.widget.name
                    );
                    return;
                }
                self.begin_acquisition().await;
            }
            // Video/screen preview is up; the second press begins capture
            RecorderState::Starting => self.begin_capture().await,
            _ => debug!(
                "Recorder '{}': start ignored in {:?}",
                self.widget.name, self.state
            ),
        }
    }

    /// Open a fresh attempt: discard any previous recording, acquire the
    /// device, then either begin capture (audio) or hold a preview.
    async fn begin_acquisition(&mut self) {
        self.recording = None;
        self.upload_rx = None;
        self.progress = None;

        let session = RecordingSession::new();
        info!(
            "Recorder '{}': session {} acquiring {} device",
            self.widget.name, session.id, self.widget.kind
        );
        self.session = Some(session);
        self.set_state(RecorderState::Starting, StatusLine::AwaitingPermission);

        let constraints = self.widget.kind.constraints(&self.settings);
        match self.gateway.acquire(&constraints).await {
            Ok(stream) => {
                self.stream = Some(stream);
                if self.widget.kind.has_video() {
                    // Hold the preview; capture starts on the next press
                    self.set_state(RecorderState::Starting, StatusLine::PreviewReady);
                } else {
                    self.begin_capture().await;
                }
            }
            Err(reason) => self.fail_capture(reason).await,
        }
    }

    /// Hand the live stream to a fresh encoder and start the countdown.
    async fn begin_capture(&mut self) {
        let Some(stream) = self.stream.take() else {
            debug!("Recorder '{}': no live stream to record", self.widget.name);
            return;
        };

        let (encoder_tx, encoder_rx) = mpsc::channel(64);
        let encoder = ChunkEncoder::spawn(
            stream,
            self.widget.kind.bitrate(&self.settings),
            self.settings.flush_interval(),
            encoder_tx,
        );

        let (timer_tx, timer_rx) = mpsc::channel(16);
        let mut timer = CountdownTimer::new(self.settings.tick_interval(), timer_tx);
        timer.start(self.widget.max_duration);

        info!(
            "Recorder '{}': recording as {}",
            self.widget.name,
            encoder.format().mime_type
        );

        self.encoder = Some(encoder);
        self.encoder_rx = Some(encoder_rx);
        self.timer = Some(timer);
        self.timer_rx = Some(timer_rx);
        self.set_state(RecorderState::Recording, StatusLine::Recording);

        let _ = self
            .notices
            .send(WidgetNotice::Started {
                widget: self.widget.name.clone(),
            })
            .await;
    }

    /// Payloads arriving while the preview is up are shown, never recorded.
    async fn handle_preview(&mut self, payload: StreamPayload) {
        match payload {
            StreamPayload::Ready | StreamPayload::Audio(_) | StreamPayload::Video(_) => {}
            StreamPayload::Ended => {
                self.stream = None;
                self.fail_capture(CaptureError::DeviceUnreadable).await;
            }
        }
    }

    async fn handle_pause(&mut self) {
        if self.state != RecorderState::Recording {
            debug!(
                "Recorder '{}': pause ignored in {:?}",
                self.widget.name, self.state
            );
            return;
        }
        if !self.widget.allow_pausing {
            debug!("Recorder '{}': pausing not allowed", self.widget.name);
            return;
        }

        if let Some(timer) = self.timer.as_mut() {
            timer.stop();
        }
        if let Some(encoder) = self.encoder.as_ref() {
            encoder.pause().await;
        }
        self.set_state(RecorderState::Paused, StatusLine::Paused);
    }

    async fn handle_resume(&mut self) {
        if self.state != RecorderState::Paused {
            debug!(
                "Recorder '{}': resume ignored in {:?}",
                self.widget.name, self.state
            );
            return;
        }

        if let Some(encoder) = self.encoder.as_ref() {
            encoder.resume().await;
        }
        if let Some(timer) = self.timer.as_mut() {
            timer.resume();
        }
        self.set_state(RecorderState::Recording, StatusLine::Recording);
    }

    /// Move to `Saving` and ask the encoder for its final flush. Safe to
    /// call repeatedly; only the first call from an active state acts.
    async fn request_stop(&mut self) {
        if !matches!(
            self.state,
            RecorderState::Recording | RecorderState::Paused
        ) {
            debug!(
                "Recorder '{}': stop ignored in {:?}",
                self.widget.name, self.state
            );
            return;
        }

        if let Some(timer) = self.timer.as_mut() {
            timer.stop();
        }
        if let Some(encoder) = self.encoder.as_ref() {
            encoder.stop().await;
        }
        self.set_state(RecorderState::Saving, StatusLine::Stopping);
    }

    async fn handle_encoder_event(&mut self, event: EncoderEvent) {
        match event {
            EncoderEvent::Chunk(chunk) => self.handle_chunk(chunk).await,
            EncoderEvent::Stopped => self.handle_encoder_stopped().await,
            EncoderEvent::Failed(reason) => {
                self.release_capture().await;
                self.fail_capture(reason).await;
            }
        }
    }

    async fn handle_chunk(&mut self, chunk: Vec<u8>) {
        if !matches!(
            self.state,
            RecorderState::Recording | RecorderState::Paused | RecorderState::Saving
        ) {
            debug!("Recorder '{}': late chunk dropped", self.widget.name);
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.append_chunk(chunk);

        // Size guard runs after append: the overshooting chunk is kept and
        // the attempt stops, warning exactly once per session
        if let Some(limit) = self.widget.size_limit() {
            if session.reached_size_limit(limit) {
                if !session.size_warned {
                    session.size_warned = true;
                    warn!(
                        "Recorder '{}': {} bytes reached the upload cap of {}, stopping",
                        self.widget.name, session.bytes_accumulated, limit
                    );
                    let _ = self
                        .notices
                        .send(WidgetNotice::NearingSizeLimit {
                            widget: self.widget.name.clone(),
                        })
                        .await;
                }
                self.request_stop().await;
                return;
            }
        }

        // Expiry wins even when this chunk beat the expiry event to the loop
        if self.state == RecorderState::Recording
            && self.timer.as_ref().is_some_and(|t| t.expired())
        {
            info!("Recorder '{}': time limit reached", self.widget.name);
            self.request_stop().await;
        }
    }

    async fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Tick { .. } => {
                if self.state == RecorderState::Recording {
                    self.publish_status();
                }
            }
            TimerEvent::Expired => {
                if matches!(
                    self.state,
                    RecorderState::Recording | RecorderState::Paused
                ) {
                    info!("Recorder '{}': time limit reached", self.widget.name);
                    self.request_stop().await;
                }
            }
        }
    }

    /// The encoder finished its final flush: release capture and finalize.
    async fn handle_encoder_stopped(&mut self) {
        let format = self.encoder.take().map(|e| e.format().clone());
        self.encoder_rx = None;
        self.drop_timer();
        self.gateway.release().await;

        if self.state != RecorderState::Saving {
            debug!(
                "Recorder '{}': encoder stopped in {:?}",
                self.widget.name, self.state
            );
            return;
        }
        let Some(format) = format else {
            return;
        };
        self.finalize(format).await;
    }

    /// Turn accumulated chunks into the finished recording.
    async fn finalize(&mut self, format: NegotiatedFormat) {
        let Some(session) = self.session.take() else {
            return;
        };

        if session.chunks.is_empty() {
            // Nothing was captured; drop the attempt without an upload
            info!(
                "Recorder '{}': session {} stopped with no data, discarding",
                self.widget.name, session.id
            );
            self.set_state(RecorderState::Recorded, StatusLine::Idle);
            let _ = self
                .notices
                .send(WidgetNotice::Stopped {
                    widget: self.widget.name.clone(),
                    has_recording: false,
                })
                .await;
            return;
        }

        match assemble_recording(&session.chunks, &format) {
            Ok(data) => {
                info!(
                    "Recorder '{}': session {} finalized, {} bytes in {} chunks over {:.1}s",
                    self.widget.name,
                    session.id,
                    data.len(),
                    session.chunks.len(),
                    session.elapsed_secs()
                );
                self.recording = Some(Recording {
                    data,
                    mime_type: format.mime_type.to_string(),
                    file_name: self.widget.file_name(format.file_extension),
                });
                self.set_state(RecorderState::Recorded, StatusLine::Complete);
                let _ = self
                    .notices
                    .send(WidgetNotice::Stopped {
                        widget: self.widget.name.clone(),
                        has_recording: true,
                    })
                    .await;
            }
            Err(e) => {
                error!(
                    "Recorder '{}': failed to assemble recording: {:#}",
                    self.widget.name, e
                );
                self.fail_capture(CaptureError::DeviceUnreadable).await;
            }
        }
    }

    /// A capture failure lands the widget back in `New` with the reason on
    /// its status line; the coordinator raises the alert.
    async fn fail_capture(&mut self, reason: CaptureError) {
        warn!("Recorder '{}': capture failed: {}", self.widget.name, reason);
        self.session = None;
        self.gateway.release().await;
        self.set_state(RecorderState::New, StatusLine::CaptureFailed(reason.clone()));
        let _ = self
            .notices
            .send(WidgetNotice::CaptureFailed {
                widget: self.widget.name.clone(),
                reason,
            })
            .await;
    }

    async fn handle_upload(&mut self) {
        if self.state != RecorderState::Recorded {
            debug!(
                "Recorder '{}': upload ignored in {:?}",
                self.widget.name, self.state
            );
            return;
        }
        if self.upload_task.is_some() {
            debug!("Recorder '{}': upload already running", self.widget.name);
            return;
        }
        let Some(recording) = self.recording.clone() else {
            debug!("Recorder '{}': nothing to upload", self.widget.name);
            return;
        };

        self.progress = Some(0.0);
        self.line = StatusLine::PreparingUpload;
        self.publish_status();

        let (events_tx, events_rx) = mpsc::channel(32);
        self.upload_rx = Some(events_rx);

        let uploader = Arc::clone(&self.uploader);
        let destination = Arc::clone(&self.destination);
        self.upload_task = Some(tokio::spawn(async move {
            uploader.upload(recording, &destination, events_tx).await;
        }));
    }

    async fn handle_upload_event(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::Progress(fraction) => {
                self.progress = Some(fraction);
                self.line = StatusLine::Uploading {
                    percent: (fraction * 100.0).round() as u8,
                };
                self.publish_status();
            }
            UploadEvent::Finished(outcome) => {
                self.upload_task = None;
                self.progress = None;
                let accepted = outcome.accepted();
                self.line = match outcome {
                    UploadOutcome::Saved => StatusLine::Saved,
                    UploadOutcome::Failed(reason) => StatusLine::UploadFailed(reason),
                };
                self.publish_status();
                let _ = self
                    .notices
                    .send(WidgetNotice::UploadFinished {
                        widget: self.widget.name.clone(),
                        accepted,
                    })
                    .await;
            }
        }
    }

    /// Release everything this machine holds. An upload still in flight is
    /// aborted and reported as a terminal failure so the page never stays
    /// locked waiting on it.
    async fn teardown(&mut self) {
        info!("Recorder '{}': teardown", self.widget.name);

        if let Some(task) = self.upload_task.take() {
            task.abort();
            self.upload_rx = None;
            self.progress = None;
            self.line = StatusLine::UploadFailed(UploadError::Aborted);
            self.publish_status();
            let _ = self
                .notices
                .send(WidgetNotice::UploadFinished {
                    widget: self.widget.name.clone(),
                    accepted: false,
                })
                .await;
        }

        self.drop_timer();
        if let Some(encoder) = self.encoder.take() {
            encoder.abort();
        }
        self.encoder_rx = None;
        self.stream = None;
        self.session = None;
        self.gateway.release().await;
    }

    async fn release_capture(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            encoder.abort();
        }
        self.encoder_rx = None;
        self.drop_timer();
    }

    fn drop_timer(&mut self) {
        if let Some(timer) = self.timer.as_mut() {
            timer.stop();
        }
        self.timer = None;
        self.timer_rx = None;
    }

    fn set_state(&mut self, state: RecorderState, line: StatusLine) {
        if self.state != state {
            debug!(
                "Recorder '{}': {:?} -> {:?}",
                self.widget.name, self.state, state
            );
        }
        self.state = state;
        self.line = line;
        self.publish_status();
    }

    fn publish_status(&self) {
        let _ = self.status.send(RecorderStatus {
            state: self.state,
            line: self.line.clone(),
            remaining: self.timer.as_ref().map(|t| t.remaining()),
            progress: self.progress,
            has_recording: self.recording.is_some(),
        });
    }
}

/// Host-facing handle to one recorder machine.
pub struct Recorder {
    widget: Widget,
    commands: mpsc::Sender<RecorderCommand>,
    status: watch::Receiver<RecorderStatus>,
    task: JoinHandle<()>,
}

impl Recorder {
    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    pub fn name(&self) -> &str {
        &self.widget.name
    }

    /// Subscribe to status snapshots.
    pub fn status(&self) -> watch::Receiver<RecorderStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    /// Send a command. Dropped silently if the machine is gone.
    pub async fn send(&self, command: RecorderCommand) {
        let _ = self.commands.send(command).await;
    }

    /// Graceful teardown: ask the machine to exit, abort it if a pending
    /// device acquisition keeps it from getting there.
    pub async fn shutdown(self) {
        if self.commands.send(RecorderCommand::Teardown).await.is_err() {
            self.task.abort();
            let _ = self.task.await;
            return;
        }

        let abort = self.task.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task).await.is_err() {
            warn!("Recorder machine did not exit in time, aborting");
            abort.abort();
        }
    }
}
