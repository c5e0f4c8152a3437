use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::model::ReconcileReport;

/// How often the compactor looks at the WAL.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// When the reconciliation sweep fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Once a day at the top of the given UTC hour.
    DailyAt { hour: u32 },
    /// Fixed period, measured from the end of the previous timed sweep.
    /// Manual runs do not shift it.
    Every(Duration),
}

impl Cadence {
    /// Time from `now` until the next sweep is due.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            Cadence::Every(period) => period,
            Cadence::DailyAt { hour } => {
                let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
                let mut next = now.date_naive().and_time(at).and_utc();
                if next <= now {
                    next += TimeDelta::days(1);
                }
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

enum SchedulerCommand {
    RunNow {
        response: oneshot::Sender<ReconcileReport>,
    },
}

/// Owns the periodic reconciliation task. Independent of request handling:
/// it only calls [`Engine::run_reconciliation`], on its cadence or on demand.
pub struct ReconciliationScheduler {
    commands: mpsc::Sender<SchedulerCommand>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    timed_runs: Arc<AtomicU64>,
}

impl ReconciliationScheduler {
    pub fn start(engine: Arc<Engine>, cadence: Cadence) -> Self {
        let (commands, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let timed_runs = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(scheduler_loop(
            engine,
            cadence,
            rx,
            cancel.clone(),
            timed_runs.clone(),
        ));
        Self {
            commands,
            cancel,
            handle,
            timed_runs,
        }
    }

    /// Manual trigger: run the same sweep now and wait for its report.
    /// Returns `None` once the scheduler has stopped.
    pub async fn run_now(&self) -> Option<ReconcileReport> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SchedulerCommand::RunNow { response: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Sweeps fired by the cadence, not counting manual runs.
    pub fn timed_runs(&self) -> u64 {
        self.timed_runs.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the task. A sweep already in progress finishes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("reconciliation scheduler task failed: {e}");
        }
    }
}

async fn scheduler_loop(
    engine: Arc<Engine>,
    cadence: Cadence,
    mut rx: mpsc::Receiver<SchedulerCommand>,
    cancel: CancellationToken,
    timed_runs: Arc<AtomicU64>,
) {
    info!("reconciliation scheduler started ({cadence:?})");
    let next_deadline = || {
        let delay = cadence.next_delay(engine.now());
        debug!("next reconciliation in {delay:?}");
        Instant::now() + delay
    };
    // Only the timer branch moves the deadline.
    let mut deadline = next_deadline();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {
                engine.run_reconciliation().await;
                timed_runs.fetch_add(1, Ordering::Relaxed);
                deadline = next_deadline();
            }
            Some(cmd) = rx.recv() => match cmd {
                SchedulerCommand::RunNow { response } => {
                    let report = engine.run_reconciliation().await;
                    let _ = response.send(report);
                }
            },
        }
    }
    info!("reconciliation scheduler stopped");
}

/// Background task that rewrites the WAL once `threshold` appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let pruned = engine.notify.prune();
        if pruned > 0 {
            debug!("pruned {pruned} idle room channels");
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            warn!("WAL compaction after {appends} appends failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use ulid::Ulid;

    use crate::model::{BookingRequest, BookingStatus};
    use crate::test_support::{test_engine, MutableClock};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, m, 0).unwrap()
    }

    #[test]
    fn daily_cadence_waits_for_todays_slot() {
        let cadence = Cadence::DailyAt { hour: 1 };
        assert_eq!(cadence.next_delay(at(0, 30)), Duration::from_secs(30 * 60));
    }

    #[test]
    fn daily_cadence_rolls_to_tomorrow() {
        let cadence = Cadence::DailyAt { hour: 1 };
        assert_eq!(cadence.next_delay(at(1, 0)), Duration::from_secs(24 * 3600));
        assert_eq!(cadence.next_delay(at(23, 0)), Duration::from_secs(2 * 3600));
    }

    #[test]
    fn fixed_cadence_is_constant() {
        let cadence = Cadence::Every(Duration::from_millis(250));
        assert_eq!(cadence.next_delay(at(12, 0)), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn run_now_returns_sweep_report_and_stop_ends_task() {
        let clock = Arc::new(MutableClock::at(2024, 1, 1));
        let (engine, user) = test_engine("scheduler_run_now.wal", clock.clone()).await;
        let engine = Arc::new(engine);

        let room = Ulid::new();
        engine.register_room(room, "12".into(), 1, 40.0).await.unwrap();
        let booking = engine
            .create_booking(BookingRequest {
                user_id: user,
                room_id: room,
                check_in: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                check_out: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                status: None,
            })
            .await
            .unwrap();

        let scheduler =
            ReconciliationScheduler::start(engine.clone(), Cadence::DailyAt { hour: 1 });
        clock.advance_days(5);

        let report = scheduler.run_now().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(report.processed_on, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        assert_eq!(
            engine.get_booking(booking.id).await.unwrap().status,
            BookingStatus::Completed
        );

        let again = scheduler.run_now().await.unwrap();
        assert_eq!(again.completed, 0);
        assert_eq!(again.rooms_recomputed, 0);

        assert!(scheduler.is_running());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn periodic_cadence_sweeps_without_a_trigger() {
        let clock = Arc::new(MutableClock::at(2024, 2, 1));
        let (engine, user) = test_engine("scheduler_periodic.wal", clock.clone()).await;
        let engine = Arc::new(engine);

        let room = Ulid::new();
        engine.register_room(room, "7".into(), 2, 40.0).await.unwrap();
        let booking = engine
            .create_booking(BookingRequest {
                user_id: user,
                room_id: room,
                check_in: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                check_out: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
                status: Some(BookingStatus::Booked),
            })
            .await
            .unwrap();
        clock.advance_days(2);

        let scheduler =
            ReconciliationScheduler::start(engine.clone(), Cadence::Every(Duration::from_millis(10)));
        let mut completed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if engine.get_booking(booking.id).await.unwrap().status == BookingStatus::Completed {
                completed = true;
                break;
            }
        }
        scheduler.stop().await;
        assert!(completed, "periodic sweep never completed the expired booking");
    }

    #[tokio::test]
    async fn manual_runs_do_not_postpone_timed_sweeps() {
        let clock = Arc::new(MutableClock::at(2024, 4, 1));
        let (engine, _) = test_engine("scheduler_manual_vs_timer.wal", clock).await;
        let engine = Arc::new(engine);

        let scheduler = ReconciliationScheduler::start(
            engine.clone(),
            Cadence::Every(Duration::from_millis(100)),
        );
        // Trigger far more often than the period; timed sweeps must still fire.
        let mut manual = 0;
        while scheduler.timed_runs() < 2 && manual < 500 {
            assert!(scheduler.run_now().await.is_some());
            manual += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let timed = scheduler.timed_runs();
        scheduler.stop().await;
        assert!(timed >= 2, "only {timed} timed sweeps during {manual} manual runs");
    }

    #[tokio::test]
    async fn compactor_stops_on_cancel() {
        let clock = Arc::new(MutableClock::at(2024, 3, 1));
        let (engine, _) = test_engine("compactor_cancel.wal", clock).await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_compactor(Arc::new(engine), 1, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
