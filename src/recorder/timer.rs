use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Events from a running countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Display refresh; correctness never depends on tick delivery
    Tick { remaining: Duration },
    /// The deadline passed
    Expired,
}

/// A suspendable countdown.
///
/// Ticks are frequent and purely cosmetic; expiry is decided by comparing
/// against the wall-clock deadline, so a missed or delayed tick cannot
/// stretch the recording budget.
pub struct CountdownTimer {
    /// Frozen remaining time while stopped; captured at the last stop
    remaining: Duration,
    deadline: Option<Instant>,
    tick_interval: Duration,
    events: mpsc::Sender<TimerEvent>,
    ticker: Option<JoinHandle<()>>,
}

impl CountdownTimer {
    pub fn new(tick_interval: Duration, events: mpsc::Sender<TimerEvent>) -> Self {
        Self {
            remaining: Duration::ZERO,
            deadline: None,
            tick_interval,
            events,
            ticker: None,
        }
    }

    /// Begin a fresh countdown of `duration`.
    pub fn start(&mut self, duration: Duration) {
        self.halt_ticker();
        self.remaining = duration;
        self.resume();
    }

    /// Freeze the countdown; a later resume continues from the frozen
    /// remaining time. Stopping a stopped timer is a no-op.
    pub fn stop(&mut self) {
        if self.ticker.is_none() {
            return;
        }
        self.remaining = self.remaining();
        self.halt_ticker();
        debug!("Countdown frozen at {}ms", self.remaining.as_millis());
    }

    /// Restart ticking from the current remaining time. Calling resume on a
    /// running timer is a no-op, so one session never gets two tick sources.
    /// Resuming an expired timer emits `Expired` again right away.
    pub fn resume(&mut self) {
        if self.ticker.as_ref().is_some_and(|ticker| !ticker.is_finished()) {
            return;
        }

        self.remaining = self.remaining();
        let deadline = Instant::now() + self.remaining;
        self.deadline = Some(deadline);

        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    let _ = events.send(TimerEvent::Expired).await;
                    return;
                }

                if events.send(TimerEvent::Tick { remaining }).await.is_err() {
                    return;
                }
            }
        }));
    }

    /// Remaining time: live while ticking, frozen while stopped.
    pub fn remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) if self.ticker.is_some() => {
                deadline.saturating_duration_since(Instant::now())
            }
            _ => self.remaining,
        }
    }

    /// Deadline comparison, independent of tick delivery.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(|ticker| !ticker.is_finished())
    }

    fn halt_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.deadline = None;
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.halt_ticker();
    }
}

/// Render remaining time for display, rounding milliseconds to the nearest
/// whole second: 90.4s shows as 1:30.
pub fn format_clock(remaining: Duration) -> String {
    let total_secs = (remaining.as_millis() as f64 / 1000.0).round() as u64;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
