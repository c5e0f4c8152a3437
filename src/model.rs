use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)`. The check-out day is free for the next guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    /// Billable nights. Zero or negative only for stays built without `new`.
    pub fn nights(&self) -> i64 {
        self.check_out.signed_duration_since(self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Booked,
    Completed,
    Cancelled,
}

/// Statuses that hold a slot of room capacity.
pub const ACTIVE_STATUSES: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::Booked];

impl BookingStatus {
    pub fn is_active(self) -> bool {
        ACTIVE_STATUSES.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Booked => "BOOKED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Occupied,
}

impl RoomStatus {
    pub fn from_count(count: u32) -> Self {
        if count > 0 {
            RoomStatus::Occupied
        } else {
            RoomStatus::Available
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Success,
    Pending,
}

/// A settled charge. Never amended once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub amount: f64,
    pub paid_at: DateTime<Utc>,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub booked_at: DateTime<Utc>,
    pub stay: Stay,
    pub status: BookingStatus,
    pub payment: Option<Payment>,
}

/// Ledger snapshot: how many active bookings covered `on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub on: NaiveDate,
    pub count: u32,
    pub status: RoomStatus,
}

impl Occupancy {
    pub fn new(on: NaiveDate, count: u32) -> Self {
        Self {
            on,
            count,
            status: RoomStatus::from_count(count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub number: String,
    /// Max simultaneous active bookings.
    pub capacity: u32,
    pub price_per_night: f64,
    /// Last persisted ledger snapshot; `None` until the first recompute.
    pub occupancy: Option<Occupancy>,
    /// Every booking ever made on the room, sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, number: String, capacity: u32, price_per_night: f64) -> Self {
        Self {
            id,
            number,
            capacity,
            price_per_night,
            occupancy: None,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings (any status) whose stay overlaps `query`.
    /// Binary search skips everything checking in on or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }

    /// Bookings (any status) whose stay covers the night of `date`.
    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.stay.check_in <= date);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > date)
    }

    pub fn current_occupancy(&self) -> u32 {
        self.occupancy.map_or(0, |o| o.count)
    }

    pub fn status(&self) -> RoomStatus {
        self.occupancy.map_or(RoomStatus::Available, |o| o.status)
    }
}

/// Flat event records; this is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RoomRegistered {
        id: Ulid,
        number: String,
        capacity: u32,
        price_per_night: f64,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        user_id: Ulid,
        booked_at: DateTime<Utc>,
        stay: Stay,
        status: BookingStatus,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    BookingCompleted {
        id: Ulid,
        room_id: Ulid,
    },
    PaymentRecorded {
        room_id: Ulid,
        payment: Payment,
    },
    OccupancyRecomputed {
        room_id: Ulid,
        occupancy: Occupancy,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomRegistered { id, .. } => *id,
            Event::BookingCreated { room_id, .. }
            | Event::BookingCancelled { room_id, .. }
            | Event::BookingCompleted { room_id, .. }
            | Event::PaymentRecorded { room_id, .. }
            | Event::OccupancyRecomputed { room_id, .. } => *room_id,
        }
    }
}

// ── Requests and query result types ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    /// Initial status; `None` means CONFIRMED.
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub number: String,
    pub capacity: u32,
    pub price_per_night: f64,
    pub current_occupancy: u32,
    pub status: RoomStatus,
    pub occupancy_on: Option<NaiveDate>,
}

impl From<&RoomState> for RoomInfo {
    fn from(rs: &RoomState) -> Self {
        Self {
            id: rs.id,
            number: rs.number.clone(),
            capacity: rs.capacity,
            price_per_night: rs.price_per_night,
            current_occupancy: rs.current_occupancy(),
            status: rs.status(),
            occupancy_on: rs.occupancy.map(|o| o.on),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub user_id: Ulid,
    pub room_id: Ulid,
    pub booked_at: DateTime<Utc>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: BookingStatus,
    pub payment: Option<Payment>,
}

impl From<&Booking> for BookingInfo {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            user_id: b.user_id,
            room_id: b.room_id,
            booked_at: b.booked_at,
            check_in: b.stay.check_in,
            check_out: b.stay.check_out,
            status: b.status,
            payment: b.payment.clone(),
        }
    }
}

/// Outcome of one reconciliation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub processed_on: NaiveDate,
    /// Bookings moved to COMPLETED by this sweep.
    pub completed: usize,
    /// Rooms whose ledger snapshot was rewritten.
    pub rooms_recomputed: usize,
    /// Per-item failures that were logged and skipped.
    pub failures: usize,
}
