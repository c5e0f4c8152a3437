//! Hard bounds on inventory size and per-room booking volume.

pub const MAX_ROOMS: usize = 100_000;
/// Confirmed or booked stays a single room may hold at once. Completed and
/// cancelled history does not count.
pub const MAX_ACTIVE_BOOKINGS_PER_ROOM: usize = 50_000;
pub const MAX_ROOM_NUMBER_LEN: usize = 32;
pub const MAX_ROOM_CAPACITY: u32 = 1_000;

/// Payments must match the computed stay cost to within this many currency units.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Upper bound on a single WAL payload; larger length prefixes are treated as corruption.
pub const MAX_WAL_FRAME_BYTES: usize = 1 << 20;
