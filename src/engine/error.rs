use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::BookingStatus;

/// Coarse classification callers use to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Validation,
    /// A validation failure callers present as "fully booked".
    CapacityExceeded,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    UserNotFound(Ulid),
    RoomNotFound(Ulid),
    BookingNotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidRoom(&'static str),
    InvalidStay {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    CheckInInPast {
        check_in: NaiveDate,
        today: NaiveDate,
    },
    InvalidInitialStatus(BookingStatus),
    CapacityExceeded {
        room_id: Ulid,
        capacity: u32,
        overlapping: u32,
    },
    AlreadyCancelled(Ulid),
    NotActive {
        id: Ulid,
        status: BookingStatus,
    },
    NotOwner {
        booking_id: Ulid,
        user_id: Ulid,
    },
    DuplicatePayment(Ulid),
    InvalidAmount {
        expected: f64,
        supplied: f64,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::UserNotFound(_)
            | EngineError::RoomNotFound(_)
            | EngineError::BookingNotFound(_) => ErrorClass::NotFound,
            EngineError::CapacityExceeded { .. } => ErrorClass::CapacityExceeded,
            EngineError::WalError(_) => ErrorClass::Internal,
            EngineError::AlreadyExists(_)
            | EngineError::InvalidRoom(_)
            | EngineError::InvalidStay { .. }
            | EngineError::CheckInInPast { .. }
            | EngineError::InvalidInitialStatus(_)
            | EngineError::AlreadyCancelled(_)
            | EngineError::NotActive { .. }
            | EngineError::NotOwner { .. }
            | EngineError::DuplicatePayment(_)
            | EngineError::InvalidAmount { .. }
            | EngineError::LimitExceeded(_) => ErrorClass::Validation,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::UserNotFound(_) => "user_not_found",
            EngineError::RoomNotFound(_) => "room_not_found",
            EngineError::BookingNotFound(_) => "booking_not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidRoom(_) => "invalid_room",
            EngineError::InvalidStay { .. } => "invalid_stay",
            EngineError::CheckInInPast { .. } => "check_in_in_past",
            EngineError::InvalidInitialStatus(_) => "invalid_initial_status",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::NotActive { .. } => "not_active",
            EngineError::NotOwner { .. } => "not_owner",
            EngineError::DuplicatePayment(_) => "duplicate_payment",
            EngineError::InvalidAmount { .. } => "invalid_amount",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UserNotFound(id) => write!(f, "user not found: {id}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidRoom(msg) => write!(f, "invalid room: {msg}"),
            EngineError::InvalidStay {
                check_in,
                check_out,
            } => write!(
                f,
                "check-out date {check_out} must be after check-in date {check_in}"
            ),
            EngineError::CheckInInPast { check_in, today } => {
                write!(f, "check-in date {check_in} cannot be in the past (today is {today})")
            }
            EngineError::InvalidInitialStatus(status) => {
                write!(f, "a booking cannot be created as {status}")
            }
            EngineError::CapacityExceeded {
                room_id,
                capacity,
                overlapping,
            } => write!(
                f,
                "room {room_id} is fully booked for the selected dates: \
                 {overlapping} active bookings against capacity {capacity}"
            ),
            EngineError::AlreadyCancelled(id) => write!(f, "booking {id} is already cancelled"),
            EngineError::NotActive { id, status } => {
                write!(f, "booking {id} is {status} and can no longer change")
            }
            EngineError::NotOwner {
                booking_id,
                user_id,
            } => write!(f, "booking {booking_id} does not belong to user {user_id}"),
            EngineError::DuplicatePayment(id) => {
                write!(f, "payment already exists for booking {id}")
            }
            EngineError::InvalidAmount { expected, supplied } => write!(
                f,
                "invalid payment amount {supplied:.2}. Expected: {expected:.2}"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
