mod conflict;
mod error;
mod ledger;
mod lifecycle;
mod mutations;
mod payment;
mod queries;
mod reconcile;

pub use conflict::count_overlapping;
pub use error::{EngineError, ErrorClass};
pub use ledger::count_active;
pub use payment::expected_amount;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use mockable::Clock;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::directory::UserDirectory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Single flush_sync for the whole batch, then answer every sender.
/// A non-append command ends the window; the batch is committed before it runs.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
    debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    let failure = append_err.or(flush_err);
    if let Some(e) = &failure {
        warn!("WAL batch of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch {
        let r = match &failure {
            None => Ok(()),
            Some(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// The booking core: room ledger, booking lifecycle, payments and the sweep.
///
/// Every room sits behind its own `RwLock`. Each mutation takes the room's
/// write lock for its whole check → WAL append → apply sequence, so admission
/// checks can never interleave on the same room.
pub struct Engine {
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) users: Arc<dyn UserDirectory>,
    pub(super) clock: Arc<dyn Clock>,
    /// Reverse lookup: booking id → room id
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    /// User → booking ids, in creation order.
    pub(super) user_bookings: DashMap<Ulid, Vec<Ulid>>,
    /// Serializes room registration against itself and against compaction.
    pub(super) registry_lock: Mutex<()>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            wal_tx,
            notify,
            users,
            clock,
            booking_to_room: DashMap::new(),
            user_bookings: DashMap::new(),
            registry_lock: Mutex::new(()),
        };

        // Rebuild plain state first; locks are only wrapped around it once replay is done.
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
        for event in &events {
            match event {
                Event::RoomRegistered {
                    id,
                    number,
                    capacity,
                    price_per_night,
                } => {
                    rooms.insert(
                        *id,
                        RoomState::new(*id, number.clone(), *capacity, *price_per_night),
                    );
                }
                other => match rooms.get_mut(&other.room_id()) {
                    Some(rs) => engine.apply(rs, other),
                    None => warn!("replay: skipping event for unknown room {}", other.room_id()),
                },
            }
        }
        for (id, rs) in rooms {
            engine.rooms.insert(id, Arc::new(RwLock::new(rs)));
        }
        debug!(
            "replayed {} events into {} rooms from {}",
            events.len(),
            engine.rooms.len(),
            wal_path.display()
        );

        Ok(engine)
    }

    /// Apply an event to a room (caller holds the room lock).
    fn apply(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::BookingCreated {
                id,
                room_id,
                user_id,
                booked_at,
                stay,
                status,
            } => {
                rs.insert_booking(Booking {
                    id: *id,
                    user_id: *user_id,
                    room_id: *room_id,
                    booked_at: *booked_at,
                    stay: *stay,
                    status: *status,
                    payment: None,
                });
                self.booking_to_room.insert(*id, *room_id);
                self.user_bookings.entry(*user_id).or_default().push(*id);
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = BookingStatus::Cancelled;
                }
            }
            Event::BookingCompleted { id, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = BookingStatus::Completed;
                }
            }
            Event::PaymentRecorded { payment, .. } => {
                if let Some(b) = rs.booking_mut(payment.booking_id) {
                    b.payment = Some(payment.clone());
                }
            }
            Event::OccupancyRecomputed { occupancy, .. } => {
                rs.occupancy = Some(*occupancy);
            }
            // Registration is handled at the map level, not here
            Event::RoomRegistered { .. } => {}
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply(rs, event);
        self.notify.send(room_id, event);
        Ok(())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// The business date: the UTC calendar day of the injected clock.
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// Clone out every room handle so no map shard is held across an await.
    pub(super) fn room_handles(&self) -> Vec<(Ulid, SharedRoomState)> {
        let mut handles: Vec<_> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles
    }

    /// Lookup booking → room, get room, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.write_owned().await;
        Ok((room_id, guard))
    }
}
