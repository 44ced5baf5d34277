// Question coordinator
//
// One coordinator per rendered question. It checks the environment, turns
// placeholders into widgets, spawns one recorder machine per widget, and
// runs the aggregator task that owns all page-level state: the answered
// map, the recording interlock and the alert queue. Hosts talk to widgets
// through the coordinator only, so every control request passes the
// interlock exactly once, in one place.

use super::page::{ControlRefused, PageStatus, QuestionAlert};
use crate::config::Settings;
use crate::media::{CaptureDeviceGateway, Environment, EnvironmentError, MediaKind};
use crate::placeholder::{PlaceholderError, PlaceholderScanner};
use crate::recorder::{
    Recorder, RecorderCommand, RecorderMachine, RecorderStatus, Widget, WidgetNotice,
};
use crate::upload::{UploadClient, UploadDestination};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How a question lays out its recorders.
#[derive(Debug, Clone)]
pub enum QuestionLayout {
    /// One default widget of the given kind, no placeholders involved
    Single(MediaKind),
    /// Widgets declared inline in the question text
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct QuestionDefinition {
    pub layout: QuestionLayout,
    /// Whether recorders on this question offer a pause control
    pub allow_pausing: bool,
}

impl QuestionDefinition {
    pub fn single(kind: MediaKind, allow_pausing: bool) -> Self {
        Self {
            layout: QuestionLayout::Single(kind),
            allow_pausing,
        }
    }

    pub fn custom(markup: impl Into<String>, allow_pausing: bool) -> Self {
        Self {
            layout: QuestionLayout::Custom(markup.into()),
            allow_pausing,
        }
    }
}

/// Why a question could not be brought up at all.
#[derive(Debug, Error)]
pub enum QuestionError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Placeholder(#[from] PlaceholderError),
    #[error("the question text declares no recording widgets")]
    NoWidgets,
    #[error("failed to prepare recorders: {0}")]
    Setup(#[from] anyhow::Error),
}

/// Builds one capture gateway per widget. Hosts plug real device access in
/// here; tests and demos hand out scripted gateways.
pub type GatewayFactory = Box<dyn Fn(MediaKind) -> Box<dyn CaptureDeviceGateway> + Send + Sync>;

/// Controls a host may request on a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetControl {
    Start,
    Pause,
    Resume,
    Stop,
}

enum ControlMessage {
    Widget {
        widget: String,
        action: WidgetControl,
        reply: oneshot::Sender<Result<(), ControlRefused>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

pub struct QuestionCoordinator {
    order: Vec<String>,
    status_handles: HashMap<String, watch::Receiver<RecorderStatus>>,
    page: watch::Receiver<PageStatus>,
    alerts: Option<mpsc::Receiver<QuestionAlert>>,
    control: mpsc::Sender<ControlMessage>,
    aggregator: JoinHandle<()>,
}

impl QuestionCoordinator {
    /// Verify the environment, resolve widgets and spawn their machines.
    /// Nothing is constructed when the environment cannot record.
    pub fn new(
        definition: QuestionDefinition,
        settings: Settings,
        environment: &Environment,
        gateways: GatewayFactory,
        destination: UploadDestination,
    ) -> Result<Self, QuestionError> {
        environment.verify()?;

        let widgets: Vec<Widget> = match &definition.layout {
            QuestionLayout::Single(kind) => {
                vec![Widget::single(*kind, &settings, definition.allow_pausing)]
            }
            QuestionLayout::Custom(markup) => {
                let scanner = PlaceholderScanner::new()?;
                scanner
                    .scan(markup)?
                    .iter()
                    .map(|spec| Widget::from_spec(spec, &settings, definition.allow_pausing))
                    .collect()
            }
        };

        if widgets.is_empty() {
            return Err(QuestionError::NoWidgets);
        }

        let uploader = Arc::new(UploadClient::new()?);
        let destination = Arc::new(destination);

        let (notice_tx, notice_rx) = mpsc::channel(64);
        let (alert_tx, alert_rx) = mpsc::channel(16);
        let (page_tx, page_rx) = watch::channel(PageStatus::initial());
        let (control_tx, control_rx) = mpsc::channel(16);

        let mut order = Vec::with_capacity(widgets.len());
        let mut recorders = HashMap::new();
        let mut status_handles = HashMap::new();
        let mut answered = HashMap::new();

        for widget in widgets {
            let name = widget.name.clone();
            let gateway = gateways(widget.kind);
            let recorder = RecorderMachine::spawn(
                widget,
                settings.clone(),
                gateway,
                Arc::clone(&uploader),
                Arc::clone(&destination),
                notice_tx.clone(),
            );

            status_handles.insert(name.clone(), recorder.status());
            answered.insert(name.clone(), false);
            recorders.insert(name.clone(), recorder);
            order.push(name);
        }

        info!("Question ready with {} recorder(s)", order.len());

        let aggregator = Aggregator {
            recorders,
            order: order.clone(),
            answered,
            busy: None,
            page: page_tx,
            alerts: alert_tx,
        };
        let task = tokio::spawn(aggregator.run(notice_rx, control_rx));

        Ok(Self {
            order,
            status_handles,
            page: page_rx,
            alerts: Some(alert_rx),
            control: control_tx,
            aggregator: task,
        })
    }

    /// Request a control action on one widget. Start requests are checked
    /// against the page interlock before they reach the machine.
    pub async fn control(
        &self,
        widget: &str,
        action: WidgetControl,
    ) -> Result<(), ControlRefused> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = ControlMessage::Widget {
            widget: widget.to_string(),
            action,
            reply: reply_tx,
        };
        if self.control.send(message).await.is_err() {
            return Err(ControlRefused::Gone);
        }
        reply_rx.await.unwrap_or(Err(ControlRefused::Gone))
    }

    pub async fn start(&self, widget: &str) -> Result<(), ControlRefused> {
        self.control(widget, WidgetControl::Start).await
    }

    pub async fn pause(&self, widget: &str) -> Result<(), ControlRefused> {
        self.control(widget, WidgetControl::Pause).await
    }

    pub async fn resume(&self, widget: &str) -> Result<(), ControlRefused> {
        self.control(widget, WidgetControl::Resume).await
    }

    pub async fn stop(&self, widget: &str) -> Result<(), ControlRefused> {
        self.control(widget, WidgetControl::Stop).await
    }

    /// Subscribe to page-level status.
    pub fn page_status(&self) -> watch::Receiver<PageStatus> {
        self.page.clone()
    }

    pub fn current_page(&self) -> PageStatus {
        self.page.borrow().clone()
    }

    /// Take the alert stream. Yields once; alerts overflow to the log if
    /// nobody listens.
    pub fn take_alerts(&mut self) -> Option<mpsc::Receiver<QuestionAlert>> {
        self.alerts.take()
    }

    /// Widget names in document order.
    pub fn widget_names(&self) -> &[String] {
        &self.order
    }

    /// Subscribe to one widget's status snapshots.
    pub fn widget_status(&self, widget: &str) -> Option<watch::Receiver<RecorderStatus>> {
        self.status_handles.get(widget).cloned()
    }

    /// Tear down every recorder, then the aggregator.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .control
            .send(ControlMessage::Shutdown { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
        self.aggregator.abort();
        let _ = self.aggregator.await;
    }
}

/// Sole owner of page-level state. Runs until shutdown or until the
/// coordinator handle disappears.
struct Aggregator {
    recorders: HashMap<String, Recorder>,
    order: Vec<String>,
    /// Which widgets hold a saved answer in the draft area
    answered: HashMap<String, bool>,
    /// Widget currently recording, holding the page lock
    busy: Option<String>,
    page: watch::Sender<PageStatus>,
    alerts: mpsc::Sender<QuestionAlert>,
}

impl Aggregator {
    async fn run(
        mut self,
        mut notices: mpsc::Receiver<WidgetNotice>,
        mut control: mpsc::Receiver<ControlMessage>,
    ) {
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(notice) => self.handle_notice(notice).await,
                    None => return,
                },
                message = control.recv() => match message {
                    Some(ControlMessage::Widget { widget, action, reply }) => {
                        let _ = reply.send(self.handle_control(widget, action).await);
                    }
                    Some(ControlMessage::Shutdown { done }) => {
                        self.shutdown_recorders().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.shutdown_recorders().await;
                        return;
                    }
                },
            }
        }
    }

    async fn handle_control(
        &mut self,
        widget: String,
        action: WidgetControl,
    ) -> Result<(), ControlRefused> {
        let Some(recorder) = self.recorders.get(&widget) else {
            return Err(ControlRefused::UnknownWidget(widget));
        };

        // The interlock gates starts only; pause/resume/stop always reach
        // the widget that is busy
        if action == WidgetControl::Start {
            if let Some(busy) = &self.busy {
                if busy != &widget {
                    return Err(ControlRefused::PageBusy);
                }
            }
        }

        let command = match action {
            WidgetControl::Start => RecorderCommand::Start,
            WidgetControl::Pause => RecorderCommand::Pause,
            WidgetControl::Resume => RecorderCommand::Resume,
            WidgetControl::Stop => RecorderCommand::Stop,
        };
        recorder.send(command).await;
        Ok(())
    }

    async fn handle_notice(&mut self, notice: WidgetNotice) {
        match notice {
            WidgetNotice::Started { widget } => {
                info!("Widget '{}' recording, page locked", widget);
                self.busy = Some(widget);
                self.publish_page();
            }
            WidgetNotice::CaptureFailed { widget, reason } => {
                self.unlock_if_held(&widget);
                self.raise_alert(QuestionAlert::CaptureFailed { widget, reason });
                self.publish_page();
            }
            WidgetNotice::NearingSizeLimit { widget } => {
                self.raise_alert(QuestionAlert::NearingSizeLimit { widget });
            }
            WidgetNotice::Stopped {
                widget,
                has_recording,
            } => {
                if has_recording {
                    // The lock stays held until the upload settles; the
                    // page must not record or submit over a live transfer
                    if let Some(recorder) = self.recorders.get(&widget) {
                        recorder.send(RecorderCommand::Upload).await;
                    }
                } else {
                    self.unlock_if_held(&widget);
                    self.publish_page();
                }
            }
            WidgetNotice::UploadFinished { widget, accepted } => {
                if accepted {
                    self.answered.insert(widget.clone(), true);
                }
                // A failed upload keeps any previously saved answer, so
                // the answered map only ever moves towards true
                self.unlock_if_held(&widget);
                self.publish_page();
            }
        }
    }

    fn unlock_if_held(&mut self, widget: &str) {
        if self.busy.as_deref() == Some(widget) {
            self.busy = None;
        }
    }

    fn raise_alert(&self, alert: QuestionAlert) {
        // Alerts are advisory; never let a full queue stall the page
        if let Err(e) = self.alerts.try_send(alert) {
            warn!("Dropping question alert: {}", e);
        }
    }

    fn publish_page(&self) {
        let any_answered = self.answered.values().any(|&answered| answered);
        let _ = self.page.send(PageStatus {
            submit_enabled: any_answered && self.busy.is_none(),
            recording_widget: self.busy.clone(),
        });
    }

    async fn shutdown_recorders(&mut self) {
        info!("Shutting down {} recorder(s)", self.order.len());
        for name in std::mem::take(&mut self.order) {
            if let Some(recorder) = self.recorders.remove(&name) {
                recorder.shutdown().await;
            }
        }
    }
}
