use chrono::NaiveDate;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, BOOKINGS_TOTAL, CANCELLATIONS_TOTAL};

use super::conflict::{check_capacity, validate_stay};
use super::{Engine, EngineError};

/// Only CONFIRMED and BOOKED may move; COMPLETED and CANCELLED are final.
pub(super) fn ensure_active(b: &Booking) -> Result<(), EngineError> {
    match b.status {
        BookingStatus::Confirmed | BookingStatus::Booked => Ok(()),
        BookingStatus::Cancelled => Err(EngineError::AlreadyCancelled(b.id)),
        BookingStatus::Completed => Err(EngineError::NotActive {
            id: b.id,
            status: b.status,
        }),
    }
}

impl Engine {
    /// Admit and persist a new booking, then refresh the room's ledger for today.
    pub async fn create_booking(&self, req: BookingRequest) -> Result<BookingInfo, EngineError> {
        let result = self.admit_booking(req).await;
        observability::record_outcome(BOOKINGS_TOTAL, &result);
        result
    }

    async fn admit_booking(&self, req: BookingRequest) -> Result<BookingInfo, EngineError> {
        let status = req.status.unwrap_or(BookingStatus::Confirmed);
        if status.is_terminal() {
            return Err(EngineError::InvalidInitialStatus(status));
        }
        if self.users.find_user(req.user_id).await.is_none() {
            return Err(EngineError::UserNotFound(req.user_id));
        }
        let booked_at = self.now();
        let today = booked_at.date_naive();
        let stay = validate_stay(req.check_in, req.check_out, today)?;

        let room_id = req.room_id;
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        let active = guard.bookings.iter().filter(|b| b.status.is_active()).count();
        if active >= MAX_ACTIVE_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many active bookings on room"));
        }

        check_capacity(&guard, &stay)?;

        let id = Ulid::new();
        let event = Event::BookingCreated {
            id,
            room_id,
            user_id: req.user_id,
            booked_at,
            stay,
            status,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        info!(
            "booking {id} {status} on room {room_id} for {}..{}",
            stay.check_in, stay.check_out
        );

        // The booking is durable; a ledger failure here is repaired by the next sweep.
        if let Err(e) = self.recompute_locked(room_id, &mut guard, today).await {
            warn!("booking {id}: occupancy recompute for room {room_id} failed: {e}");
        }

        guard
            .booking(id)
            .map(BookingInfo::from)
            .ok_or(EngineError::BookingNotFound(id))
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        let result = self.cancel(id, None).await;
        observability::record_outcome(CANCELLATIONS_TOTAL, &result);
        result
    }

    /// Cancel on behalf of a guest; the booking must be theirs.
    pub async fn cancel_booking_for_user(
        &self,
        user_id: Ulid,
        id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        let result = self.cancel(id, Some(user_id)).await;
        observability::record_outcome(CANCELLATIONS_TOTAL, &result);
        result
    }

    async fn cancel(&self, id: Ulid, requester: Option<Ulid>) -> Result<BookingInfo, EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if let Some(user_id) = requester.filter(|u| *u != booking.user_id) {
            return Err(EngineError::NotOwner {
                booking_id: id,
                user_id,
            });
        }
        ensure_active(booking)?;

        let event = Event::BookingCancelled { id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        info!("booking {id} cancelled on room {room_id}");

        let today = self.today();
        if let Err(e) = self.recompute_locked(room_id, &mut guard, today).await {
            warn!("booking {id}: occupancy recompute for room {room_id} failed: {e}");
        }

        guard
            .booking(id)
            .map(BookingInfo::from)
            .ok_or(EngineError::BookingNotFound(id))
    }

    /// Move an expired active booking to COMPLETED. Returns false when the booking
    /// is no longer eligible (already terminal, or checks out on/after `today`).
    pub(super) async fn complete_locked(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        id: Ulid,
        today: NaiveDate,
    ) -> Result<bool, EngineError> {
        let booking = rs.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if ensure_active(booking).is_err() || booking.stay.check_out >= today {
            return Ok(false);
        }
        let event = Event::BookingCompleted { id, room_id };
        self.persist_and_apply(room_id, rs, &event).await?;
        Ok(true)
    }
}
