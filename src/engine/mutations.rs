use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::ROOMS_REGISTERED;

use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Add a room to the inventory. Rooms are never removed once registered.
    pub async fn register_room(
        &self,
        id: Ulid,
        number: String,
        capacity: u32,
        price_per_night: f64,
    ) -> Result<(), EngineError> {
        if number.trim().is_empty() {
            return Err(EngineError::InvalidRoom("room number is empty"));
        }
        if number.len() > MAX_ROOM_NUMBER_LEN {
            return Err(EngineError::LimitExceeded("room number too long"));
        }
        if capacity == 0 {
            return Err(EngineError::InvalidRoom("capacity must be at least 1"));
        }
        if capacity > MAX_ROOM_CAPACITY {
            return Err(EngineError::LimitExceeded("capacity too large"));
        }
        if !price_per_night.is_finite() || price_per_night < 0.0 {
            return Err(EngineError::InvalidRoom("price per night must be a non-negative amount"));
        }

        let _registry = self.registry_lock.lock().await;
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let event = Event::RoomRegistered {
            id,
            number: number.clone(),
            capacity,
            price_per_night,
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, number.clone(), capacity, price_per_night);
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
        self.notify.send(id, &event);
        metrics::gauge!(ROOMS_REGISTERED).set(self.rooms.len() as f64);
        info!("room {number} ({id}) registered: capacity {capacity}, {price_per_night:.2}/night");
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    ///
    /// Every room is read-locked until the writer has swapped files, so no append
    /// can land in the old log after its room was captured.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registry = self.registry_lock.lock().await;
        let mut guards = Vec::new();
        for (_, rs) in self.room_handles() {
            guards.push(rs.read_owned().await);
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::RoomRegistered {
                id: guard.id,
                number: guard.number.clone(),
                capacity: guard.capacity,
                price_per_night: guard.price_per_night,
            });
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    room_id: guard.id,
                    user_id: b.user_id,
                    booked_at: b.booked_at,
                    stay: b.stay,
                    status: b.status,
                });
                if let Some(payment) = &b.payment {
                    events.push(Event::PaymentRecorded {
                        room_id: guard.id,
                        payment: payment.clone(),
                    });
                }
            }
            if let Some(occupancy) = guard.occupancy {
                events.push(Event::OccupancyRecomputed {
                    room_id: guard.id,
                    occupancy,
                });
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(guards);

        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
