use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::conflict::count_overlapping;
use super::{Engine, EngineError};

/// Bookings on the room covering the night of `on` whose status is in `statuses`.
pub fn count_active(rs: &RoomState, on: NaiveDate, statuses: &[BookingStatus]) -> u32 {
    let n = rs
        .on_date(on)
        .filter(|b| statuses.contains(&b.status))
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Derive the ledger snapshot for `on` from the booking set alone.
pub(crate) fn snapshot(rs: &RoomState, on: NaiveDate) -> Occupancy {
    Occupancy::new(on, count_active(rs, on, &ACTIVE_STATUSES))
}

pub(super) struct Recomputed {
    pub occupancy: Occupancy,
    /// False when the stored snapshot already matched and nothing was written.
    pub written: bool,
}

impl Engine {
    /// Recompute occupancy under a write guard the caller already holds.
    pub(super) async fn recompute_locked(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        on: NaiveDate,
    ) -> Result<Recomputed, EngineError> {
        let occupancy = snapshot(rs, on);
        debug_assert!(occupancy.count <= rs.capacity, "occupancy above capacity");
        if rs.occupancy == Some(occupancy) {
            return Ok(Recomputed {
                occupancy,
                written: false,
            });
        }
        let event = Event::OccupancyRecomputed { room_id, occupancy };
        self.persist_and_apply(room_id, rs, &event).await?;
        debug!(
            "room {room_id} occupancy on {on}: {} ({:?})",
            occupancy.count, occupancy.status
        );
        Ok(Recomputed {
            occupancy,
            written: true,
        })
    }

    /// Recompute and persist a room's occupancy for `on`.
    pub async fn recompute_occupancy(
        &self,
        room_id: Ulid,
        on: NaiveDate,
    ) -> Result<Occupancy, EngineError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        Ok(self.recompute_locked(room_id, &mut guard, on).await?.occupancy)
    }

    /// Active bookings covering `on`, read straight from the booking set.
    pub async fn room_occupancy(&self, room_id: Ulid, on: NaiveDate) -> Result<u32, EngineError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(count_active(&guard, on, &ACTIVE_STATUSES))
    }

    /// How many more bookings the room would admit for `[check_in, check_out)`.
    pub async fn remaining_capacity(
        &self,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<u32, EngineError> {
        if check_out <= check_in {
            return Err(EngineError::InvalidStay {
                check_in,
                check_out,
            });
        }
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        let overlapping = count_overlapping(&guard, &Stay::new(check_in, check_out), &ACTIVE_STATUSES);
        Ok(guard.capacity.saturating_sub(overlapping))
    }
}
