// Settlement Scheduler - fires the settlement trigger on wall-clock minute boundaries
//
// - First run lands on the next minute boundary (second = 0)
// - Every following run is re-aligned to the next boundary before it is armed,
//   so the cadence never drifts the way a bare fixed-period timer does
// - At most one settlement request is in flight; a tick that finds the
//   previous request outstanding is skipped, never queued

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::trigger::{run_once, SettlementTrigger};
use super::SettlementCycle;
use crate::config::SETTLEMENT_PERIOD_SECS;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `(60 - seconds) * 1000 - milliseconds` until the next minute boundary
pub fn delay_until_next_minute(now: DateTime<Utc>) -> Duration {
    let seconds = now.second() as u64;
    // leap seconds report >= 1000 ms
    let millis = (now.timestamp_subsec_millis() as u64).min(999);
    Duration::from_millis((60 - seconds) * 1000 - millis)
}

pub fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let period = SETTLEMENT_PERIOD_SECS as i64;
    let next = (now.timestamp().div_euclid(period) + 1) * period;
    DateTime::from_timestamp(next, 0).unwrap_or(now)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    #[default]
    Idle,
    WaitingForBoundary,
    Armed,
    Firing,
    Skipped,
    Stopped,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub in_flight: bool,
    pub fired: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub last_cycle: Option<SettlementCycle>,
}

#[derive(Default)]
struct SchedulerShared {
    status: Mutex<SchedulerStatus>,
    in_flight: AtomicBool,
}

/// Read-only view of a running scheduler
#[derive(Clone, Default)]
pub struct SchedulerMonitor {
    shared: Arc<SchedulerShared>,
}

impl SchedulerMonitor {
    pub fn status(&self) -> SchedulerStatus {
        let mut status = self.shared.status.lock().clone();
        status.in_flight = self.shared.in_flight.load(Ordering::Acquire);
        status
    }

    fn update(&self, apply: impl FnOnce(&mut SchedulerStatus)) {
        apply(&mut self.shared.status.lock());
    }

    fn try_acquire(&self) -> Option<InFlightGuard> {
        self.shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                monitor: self.clone(),
            })
    }

    fn record(&self, cycle: SettlementCycle) {
        self.update(|status| {
            if cycle.succeeded {
                status.succeeded += 1;
            } else {
                status.failed += 1;
            }
            status.last_cycle = Some(cycle);
        });
    }
}

/// Clears the in-flight flag when the settlement task ends, even on panic
struct InFlightGuard {
    monitor: SchedulerMonitor,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.monitor.shared.in_flight.store(false, Ordering::Release);
    }
}

/// Settlement scheduler - minute-aligned, single-flight settlement cadence
pub struct SettlementScheduler {
    trigger: Arc<dyn SettlementTrigger>,
    clock: Arc<dyn Clock>,
}

impl SettlementScheduler {
    pub fn new(trigger: Arc<dyn SettlementTrigger>) -> Self {
        Self {
            trigger,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the scheduler (runs in background)
    pub fn start(self) -> SchedulerHandle {
        let monitor = SchedulerMonitor::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(Self::run(
            self.trigger,
            self.clock,
            monitor.clone(),
            shutdown_rx,
        ));

        SchedulerHandle {
            monitor,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        trigger: Arc<dyn SettlementTrigger>,
        clock: Arc<dyn Clock>,
        monitor: SchedulerMonitor,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut last_scheduled: Option<DateTime<Utc>> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            let now = clock.now();
            let scheduled_at = Self::next_fire_time(now, last_scheduled);
            let delay = (scheduled_at - now).to_std().unwrap_or(Duration::ZERO);

            monitor.update(|status| {
                status.state = if last_scheduled.is_none() {
                    SchedulerState::WaitingForBoundary
                } else {
                    SchedulerState::Armed
                };
                status.next_fire_at = Some(scheduled_at);
            });
            info!(
                "⏰ Next settlement scheduled at {} UTC (in {} ms)",
                scheduled_at.format("%H:%M:%S"),
                delay.as_millis()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            last_scheduled = Some(scheduled_at);

            let Some(guard) = monitor.try_acquire() else {
                warn!(
                    "⏭️ Previous settlement still in flight, skipping cycle for {} UTC",
                    scheduled_at.format("%H:%M:%S")
                );
                monitor.update(|status| {
                    status.state = SchedulerState::Skipped;
                    status.skipped += 1;
                });
                continue;
            };

            let id = Uuid::new_v4();
            let fired_at = clock.now();
            info!(
                "🔔 Executing scheduled settlement {} for {} UTC",
                id,
                scheduled_at.format("%H:%M:%S")
            );
            monitor.update(|status| {
                status.state = SchedulerState::Firing;
                status.fired += 1;
            });

            let trigger = trigger.clone();
            let clock = clock.clone();
            let task_monitor = monitor.clone();
            in_flight = Some(tokio::spawn(async move {
                let _guard = guard;
                let result = run_once(trigger.as_ref()).await;
                let cycle =
                    SettlementCycle::completed(id, scheduled_at, fired_at, clock.now(), &result);
                task_monitor.record(cycle);
            }));
        }

        // An outstanding request is allowed to finish; its result is still logged
        if let Some(task) = in_flight.take() {
            if !task.is_finished() {
                info!("⏳ Waiting for in-flight settlement to finish");
            }
            if let Err(e) = task.await {
                error!("❌ Settlement task ended abnormally: {}", e);
            }
        }

        monitor.update(|status| {
            status.state = SchedulerState::Stopped;
            status.next_fire_at = None;
        });
        info!("🛑 Settlement scheduler stopped");
    }

    /// Next minute boundary, strictly after the previously scheduled one
    fn next_fire_time(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let boundary = next_minute_boundary(now);
        match last {
            Some(last) if boundary <= last => {
                last + TimeDelta::seconds(SETTLEMENT_PERIOD_SECS as i64)
            }
            _ => boundary,
        }
    }
}

/// Owner of a running scheduler. `shutdown` is the only way to stop it.
pub struct SchedulerHandle {
    monitor: SchedulerMonitor,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn monitor(&self) -> SchedulerMonitor {
        self.monitor.clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        self.monitor.status()
    }

    /// Cancels the pending timer and waits for an in-flight request to finish
    pub async fn shutdown(self) -> SchedulerStatus {
        // the loop may already be gone; nothing to signal then
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("❌ Settlement scheduler ended abnormally: {}", e);
        }
        self.monitor.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TriggerError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::Instant;

    /// Wall clock driven by tokio's pausable time
    struct TokioClock {
        base: DateTime<Utc>,
        origin: Instant,
    }

    impl TokioClock {
        fn starting_at(base: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                base,
                origin: Instant::now(),
            })
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + TimeDelta::from_std(self.origin.elapsed()).unwrap()
        }
    }

    struct RecordingTrigger {
        clock: Arc<TokioClock>,
        work: Duration,
        fail: bool,
        calls: Mutex<Vec<DateTime<Utc>>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl RecordingTrigger {
        fn new(clock: Arc<TokioClock>, work: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                clock,
                work,
                fail,
                calls: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<DateTime<Utc>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SettlementTrigger for RecordingTrigger {
        async fn trigger(&self) -> Result<(), TriggerError> {
            self.calls.lock().push(self.clock.now());
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            tokio::time::sleep(self.work).await;

            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(TriggerError::Application(vec!["rejected".to_string()]))
            } else {
                Ok(())
            }
        }
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 37).unwrap() + TimeDelta::milliseconds(500)
    }

    fn minute(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, m, 0).unwrap()
    }

    fn assert_near(actual: DateTime<Utc>, expected: DateTime<Utc>) {
        let drift = (actual - expected).num_milliseconds().abs();
        assert!(drift <= 5, "fired at {actual}, expected {expected}");
    }

    #[test]
    fn test_delay_until_next_minute() {
        assert_eq!(delay_until_next_minute(start_time()), Duration::from_millis(22_500));
        assert_eq!(delay_until_next_minute(minute(20)), Duration::from_secs(60));
        assert_eq!(
            delay_until_next_minute(minute(21) - TimeDelta::milliseconds(1)),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_next_minute_boundary() {
        assert_eq!(next_minute_boundary(start_time()), minute(16));
        assert_eq!(next_minute_boundary(minute(16)), minute(17));
    }

    #[test]
    fn test_early_wakeup_does_not_refire_same_boundary() {
        let early = minute(16) - TimeDelta::milliseconds(1);
        assert_eq!(
            SettlementScheduler::next_fire_time(early, Some(minute(16))),
            minute(17)
        );
        assert_eq!(SettlementScheduler::next_fire_time(early, None), minute(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_minute_boundaries() {
        let clock = TokioClock::starting_at(start_time());
        let trigger = RecordingTrigger::new(clock.clone(), Duration::ZERO, false);
        let handle = SettlementScheduler::new(trigger.clone())
            .with_clock(clock.clone())
            .start();

        tokio::time::sleep(Duration::from_millis(22_500 + 120_000 + 100)).await;

        let calls = trigger.calls();
        assert_eq!(calls.len(), 3);
        assert_near(calls[0], minute(16));
        assert_near(calls[1], minute(17));
        assert_near(calls[2], minute(18));

        let status = handle.shutdown().await;
        assert_eq!(status.state, SchedulerState::Stopped);
        assert_eq!(status.fired, 3);
        assert_eq!(status.succeeded, 3);
        assert_eq!(status.skipped, 0);
        let last = status.last_cycle.unwrap();
        assert!(last.succeeded);
        assert_eq!(last.scheduled_at, minute(18));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let clock = TokioClock::starting_at(start_time());
        // each request outlives the period
        let trigger = RecordingTrigger::new(clock.clone(), Duration::from_secs(90), false);
        let handle = SettlementScheduler::new(trigger.clone())
            .with_clock(clock.clone())
            .start();

        tokio::time::sleep(Duration::from_millis(22_500 + 60_000 + 100)).await;
        let status = handle.status();
        assert_eq!(status.fired, 1);
        assert_eq!(status.skipped, 1);
        assert!(status.in_flight);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let calls = trigger.calls();
        assert_eq!(calls.len(), 2);
        assert_near(calls[0], minute(16));
        assert_near(calls[1], minute(18));
        assert_eq!(trigger.max_active.load(Ordering::SeqCst), 1);

        let status = handle.shutdown().await;
        assert_eq!(status.fired, 2);
        assert_eq!(status.skipped, 1);
        assert_eq!(status.succeeded, 2);
        assert!(!status.in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_cadence() {
        let clock = TokioClock::starting_at(start_time());
        let trigger = RecordingTrigger::new(clock.clone(), Duration::ZERO, true);
        let handle = SettlementScheduler::new(trigger.clone())
            .with_clock(clock.clone())
            .start();

        tokio::time::sleep(Duration::from_millis(22_500 + 60_000 + 100)).await;

        let status = handle.shutdown().await;
        assert_eq!(trigger.calls().len(), 2);
        assert_eq!(status.failed, 2);
        assert_eq!(status.succeeded, 0);
        let last = status.last_cycle.unwrap();
        assert!(!last.succeeded);
        assert!(last.error_detail.unwrap().contains("rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_timer() {
        let clock = TokioClock::starting_at(start_time());
        let trigger = RecordingTrigger::new(clock.clone(), Duration::ZERO, false);
        let handle = SettlementScheduler::new(trigger.clone())
            .with_clock(clock.clone())
            .start();

        tokio::task::yield_now().await;
        assert_eq!(handle.status().state, SchedulerState::WaitingForBoundary);
        assert_eq!(handle.status().next_fire_at, Some(minute(16)));

        let status = handle.shutdown().await;

        assert_eq!(status.state, SchedulerState::Stopped);
        assert!(status.next_fire_at.is_none());
        assert_eq!(status.fired, 0);
        assert!(trigger.calls().is_empty());
        assert!(clock.now() < minute(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_in_flight_request_finish() {
        let clock = TokioClock::starting_at(start_time());
        let trigger = RecordingTrigger::new(clock.clone(), Duration::from_secs(20), false);
        let handle = SettlementScheduler::new(trigger.clone())
            .with_clock(clock.clone())
            .start();

        tokio::time::sleep(Duration::from_millis(22_500 + 1_000)).await;
        assert!(handle.status().in_flight);

        let status = handle.shutdown().await;

        assert_eq!(status.state, SchedulerState::Stopped);
        assert_eq!(status.succeeded, 1);
        assert!(!status.in_flight);
        let last = status.last_cycle.unwrap();
        assert_near(last.finished_at, minute(16) + TimeDelta::seconds(20));
    }
}
