use chrono::NaiveDate;

use crate::model::*;

use super::EngineError;

/// Bookings on the room whose stay overlaps `stay` and whose status is in `statuses`.
pub fn count_overlapping(rs: &RoomState, stay: &Stay, statuses: &[BookingStatus]) -> u32 {
    let n = rs
        .overlapping(stay)
        .filter(|b| statuses.contains(&b.status))
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Admit a new stay only while active overlapping bookings stay below capacity.
pub(crate) fn check_capacity(rs: &RoomState, stay: &Stay) -> Result<(), EngineError> {
    let overlapping = count_overlapping(rs, stay, &ACTIVE_STATUSES);
    if overlapping >= rs.capacity {
        return Err(EngineError::CapacityExceeded {
            room_id: rs.id,
            capacity: rs.capacity,
            overlapping,
        });
    }
    Ok(())
}

pub(crate) fn validate_stay(
    check_in: NaiveDate,
    check_out: NaiveDate,
    today: NaiveDate,
) -> Result<Stay, EngineError> {
    if check_out <= check_in {
        return Err(EngineError::InvalidStay {
            check_in,
            check_out,
        });
    }
    if check_in < today {
        return Err(EngineError::CheckInInPast { check_in, today });
    }
    Ok(Stay::new(check_in, check_out))
}
