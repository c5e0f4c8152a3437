use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    RECONCILE_COMPLETED_TOTAL, RECONCILE_DURATION_SECONDS, RECONCILE_FAILURES_TOTAL,
    RECONCILE_RUNS_TOTAL,
};

use super::Engine;

/// Active bookings on the room that checked out before `today`.
fn expired_ids(rs: &RoomState, today: NaiveDate) -> Vec<Ulid> {
    rs.bookings
        .iter()
        .filter(|b| b.status.is_active() && b.stay.check_out < today)
        .map(|b| b.id)
        .collect()
}

/// The stored snapshot is from an earlier day (or was never taken).
fn ledger_is_stale(rs: &RoomState, today: NaiveDate) -> bool {
    rs.occupancy.is_none_or(|o| o.on < today)
}

impl Engine {
    /// `(booking_id, room_id)` of every active booking that checked out before `today`.
    pub async fn collect_expired_bookings(&self, today: NaiveDate) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for (room_id, rs) in self.room_handles() {
            let guard = rs.read().await;
            expired.extend(expired_ids(&guard, today).into_iter().map(|id| (id, room_id)));
        }
        expired
    }

    /// One reconciliation sweep for the current business date.
    ///
    /// Completes expired bookings, then recomputes the ledger of every room that
    /// had a completion or whose snapshot predates today. Failures on one booking
    /// or room are logged and counted; the sweep carries on. Running it again on
    /// the same day finds nothing to do.
    pub async fn run_reconciliation(&self) -> ReconcileReport {
        let started = Instant::now();
        let today = self.today();
        let mut report = ReconcileReport {
            processed_on: today,
            completed: 0,
            rooms_recomputed: 0,
            failures: 0,
        };

        for (room_id, rs) in self.room_handles() {
            {
                let guard = rs.read().await;
                if !ledger_is_stale(&guard, today) && expired_ids(&guard, today).is_empty() {
                    continue;
                }
            }

            // Selection is repeated under the write lock: a cancel may have won the race.
            let mut guard = rs.write().await;
            for id in expired_ids(&guard, today) {
                match self.complete_locked(room_id, &mut guard, id, today).await {
                    Ok(true) => {
                        report.completed += 1;
                        debug!("booking {id} completed on room {room_id}");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        report.failures += 1;
                        warn!("reconcile: could not complete booking {id}: {e}");
                    }
                }
            }

            match self.recompute_locked(room_id, &mut guard, today).await {
                Ok(r) if r.written => report.rooms_recomputed += 1,
                Ok(_) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!("reconcile: could not recompute room {room_id}: {e}");
                }
            }
        }

        metrics::counter!(RECONCILE_RUNS_TOTAL).increment(1);
        metrics::counter!(RECONCILE_COMPLETED_TOTAL).increment(report.completed as u64);
        metrics::counter!(RECONCILE_FAILURES_TOTAL).increment(report.failures as u64);
        metrics::histogram!(RECONCILE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(
            "reconciliation for {today}: {} completed, {} rooms recomputed, {} failures",
            report.completed, report.rooms_recomputed, report.failures
        );
        report
    }
}
