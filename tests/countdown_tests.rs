// Integration tests for the recording countdown
//
// These tests run against real tokio time with short durations. Assertions
// stay loose on tick cadence (display-only) and tight on the freeze/resume
// bookkeeping and the expiry contract.

use quiz_recorder::{CountdownTimer, TimerEvent};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next_event(rx: &mut mpsc::Receiver<TimerEvent>) -> TimerEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a timer event")
        .expect("timer event channel closed")
}

#[tokio::test]
async fn test_ticks_carry_decreasing_remaining() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut timer = CountdownTimer::new(Duration::from_millis(20), tx);
    timer.start(Duration::from_millis(500));

    let mut last = Duration::MAX;
    for _ in 0..5 {
        match next_event(&mut rx).await {
            TimerEvent::Tick { remaining } => {
                assert!(remaining <= last, "remaining should never grow");
                last = remaining;
            }
            TimerEvent::Expired => panic!("expired long before the deadline"),
        }
    }
    assert!(last < Duration::from_millis(500));
}

#[tokio::test]
async fn test_expired_fires_near_the_deadline() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut timer = CountdownTimer::new(Duration::from_millis(20), tx);

    let started = Instant::now();
    timer.start(Duration::from_millis(200));

    loop {
        if let TimerEvent::Expired = next_event(&mut rx).await {
            break;
        }
    }

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(180),
        "expired too early: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(1500),
        "expired far too late: {:?}",
        elapsed
    );
    assert!(timer.expired());
}

#[tokio::test]
async fn test_stop_freezes_remaining_exactly() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut timer = CountdownTimer::new(Duration::from_millis(20), tx);
    timer.start(Duration::from_secs(10));

    // Let it run a little, then freeze
    tokio::time::sleep(Duration::from_millis(100)).await;
    timer.stop();
    assert!(!timer.is_running());

    let frozen = timer.remaining();
    assert!(frozen < Duration::from_secs(10));
    assert!(frozen > Duration::from_secs(9));

    // Frozen means frozen: no drift while stopped, no ticks either
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(timer.remaining(), frozen);
    while let Ok(event) = rx.try_recv() {
        assert!(
            matches!(event, TimerEvent::Tick { .. }),
            "no expiry may arrive while frozen"
        );
    }
}

#[tokio::test]
async fn test_resume_continues_from_frozen_remaining() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut timer = CountdownTimer::new(Duration::from_millis(10), tx);
    timer.start(Duration::from_millis(150));

    tokio::time::sleep(Duration::from_millis(50)).await;
    timer.stop();
    let frozen = timer.remaining();

    // A long pause must not eat into the budget
    tokio::time::sleep(Duration::from_millis(300)).await;
    let resumed_at = Instant::now();
    timer.resume();
    assert!(timer.is_running());

    loop {
        if let TimerEvent::Expired = next_event(&mut rx).await {
            break;
        }
    }

    // Expiry lands roughly one frozen-remaining after the resume
    let elapsed = resumed_at.elapsed();
    assert!(
        elapsed + Duration::from_millis(30) >= frozen,
        "expired {:?} after resume with {:?} frozen",
        elapsed,
        frozen
    );
}

#[tokio::test]
async fn test_resume_while_running_is_idempotent() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut timer = CountdownTimer::new(Duration::from_millis(20), tx);
    timer.start(Duration::from_millis(200));

    // Spurious resumes must not spawn extra tickers or reset the deadline
    timer.resume();
    timer.resume();

    let mut expirations = 0;
    while let Some(event) = {
        match timeout(Duration::from_millis(600), rx.recv()).await {
            Ok(event) => event,
            Err(_) => None,
        }
    } {
        if matches!(event, TimerEvent::Expired) {
            expirations += 1;
        }
    }

    assert_eq!(expirations, 1, "exactly one expiry per countdown");
}

#[tokio::test]
async fn test_resume_after_expiry_expires_again_immediately() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut timer = CountdownTimer::new(Duration::from_millis(10), tx);
    timer.start(Duration::from_millis(60));

    loop {
        if let TimerEvent::Expired = next_event(&mut rx).await {
            break;
        }
    }
    assert_eq!(timer.remaining(), Duration::ZERO);

    // Nothing left on the clock: resuming re-signals expiry straight away
    let resumed_at = Instant::now();
    timer.resume();
    loop {
        if let TimerEvent::Expired = next_event(&mut rx).await {
            break;
        }
    }
    assert!(resumed_at.elapsed() < Duration::from_millis(100));
}
