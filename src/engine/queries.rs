use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_room(&self, room_id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(RoomInfo::from(&*guard))
    }

    /// All rooms, ordered by room number.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = Vec::new();
        for (_, rs) in self.room_handles() {
            let guard = rs.read().await;
            rooms.push(RoomInfo::from(&*guard));
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        rooms
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<BookingInfo, EngineError> {
        let room_id = self
            .room_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        guard
            .booking(booking_id)
            .map(BookingInfo::from)
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// Every booking a user has made, in any status, ordered by check-in.
    pub async fn bookings_for_user(&self, user_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        if self.users.find_user(user_id).await.is_none() {
            return Err(EngineError::UserNotFound(user_id));
        }
        let ids = self
            .user_bookings
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut bookings = Vec::with_capacity(ids.len());
        for id in ids {
            bookings.push(self.get_booking(id).await?);
        }
        bookings.sort_by_key(|b| (b.check_in, b.id));
        Ok(bookings)
    }

    /// Bookings (any status) on a room whose stay overlaps `[from, to)`.
    pub async fn bookings_for_room(
        &self,
        room_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        if to <= from {
            return Err(EngineError::InvalidStay {
                check_in: from,
                check_out: to,
            });
        }
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .overlapping(&Stay::new(from, to))
            .map(BookingInfo::from)
            .collect())
    }
}
