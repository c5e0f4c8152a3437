use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use roomledger::directory::InMemoryDirectory;
use roomledger::engine::{Engine, EngineError, ErrorClass};
use roomledger::inventory::Inventory;
use roomledger::model::{BookingRequest, BookingStatus, Event, RoomStatus};
use roomledger::notify::NotifyHub;
use roomledger::scheduler::{Cadence, ReconciliationScheduler};
use roomledger::test_support::MutableClock;

// ── Test infrastructure ──────────────────────────────────────

fn data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("roomledger_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

struct Hotel {
    engine: Arc<Engine>,
    clock: Arc<MutableClock>,
    guests: Vec<Ulid>,
    rooms: Vec<Ulid>,
}

/// Engine seeded through the inventory loader: rooms "101" (1 bed), "102" (2 beds)
/// at 60.00/night, and three guests.
async fn open_hotel() -> Hotel {
    let guests: Vec<Ulid> = (0..3).map(|_| Ulid::new()).collect();
    let rooms: Vec<Ulid> = (0..2).map(|_| Ulid::new()).collect();
    let json = format!(
        r#"{{
            "rooms": [
                {{"id": "{}", "number": "101", "capacity": 1, "price_per_night": 60.0}},
                {{"id": "{}", "number": "102", "capacity": 2, "price_per_night": 60.0}}
            ],
            "users": [
                {{"id": "{}", "name": "Ada"}},
                {{"id": "{}", "name": "Grace", "email": "grace@example.com"}},
                {{"id": "{}", "name": "Linus"}}
            ]
        }}"#,
        rooms[0], rooms[1], guests[0], guests[1], guests[2]
    );

    let clock = Arc::new(MutableClock::at(2024, 3, 1));
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = Engine::new(
        data_dir().join("roomledger.wal"),
        Arc::new(NotifyHub::new()),
        directory.clone(),
        clock.clone(),
    )
    .unwrap();

    let inventory = Inventory::parse(&json).unwrap();
    assert_eq!(assert_ok!(inventory.apply(&engine, &directory).await), 2);
    // Second load is a no-op for rooms already registered.
    assert_eq!(assert_ok!(inventory.apply(&engine, &directory).await), 0);
    assert_eq!(directory.len(), 3);

    Hotel {
        engine: Arc::new(engine),
        clock,
        guests,
        rooms,
    }
}

fn stay(user_id: Ulid, room_id: Ulid, check_in: NaiveDate, check_out: NaiveDate) -> BookingRequest {
    BookingRequest {
        user_id,
        room_id,
        check_in,
        check_out,
        status: None,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn guests_race_for_the_last_beds() {
    let hotel = open_hotel().await;
    let room = hotel.rooms[1];

    let attempts = (0..12).map(|i| {
        let engine = hotel.engine.clone();
        let guest = hotel.guests[i % hotel.guests.len()];
        async move { engine.create_booking(stay(guest, room, d(10), d(13))).await }
    });
    let results = join_all(attempts).await;

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 2);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.class(), ErrorClass::CapacityExceeded);
    }
    assert_eq!(
        assert_ok!(hotel.engine.remaining_capacity(room, d(12), d(14)).await),
        0
    );
}

#[tokio::test]
async fn stay_is_booked_paid_and_closed_out() {
    let hotel = open_hotel().await;
    let (guest, room) = (hotel.guests[0], hotel.rooms[0]);
    let mut feed = hotel.engine.notify.subscribe(room);

    let booking = assert_ok!(hotel.engine.create_booking(stay(guest, room, d(1), d(4))).await);
    assert!(matches!(feed.recv().await.unwrap(), Event::BookingCreated { id, .. } if id == booking.id));
    assert_eq!(
        assert_ok!(hotel.engine.get_room(room).await).status,
        RoomStatus::Occupied
    );

    let short = assert_err!(hotel.engine.pay_for_booking(booking.id, 120.0, None).await);
    assert!(matches!(short, EngineError::InvalidAmount { expected, .. } if expected == 180.0));
    let paid = assert_ok!(hotel.engine.pay_for_booking(booking.id, 180.0, None).await);
    assert!(paid.payment.is_some());

    let scheduler =
        ReconciliationScheduler::start(hotel.engine.clone(), Cadence::DailyAt { hour: 1 });
    hotel.clock.advance_days(4);
    let report = scheduler.run_now().await.unwrap();
    assert_eq!(report.processed_on, d(5));
    assert_eq!(report.completed, 1);
    assert_eq!(report.failures, 0);
    scheduler.stop().await;

    let closed = assert_ok!(hotel.engine.get_booking(booking.id).await);
    assert_eq!(closed.status, BookingStatus::Completed);
    assert_eq!(
        assert_ok!(hotel.engine.get_room(room).await).status,
        RoomStatus::Available
    );
    let history = assert_ok!(hotel.engine.bookings_for_user(guest).await);
    assert_eq!(history, vec![closed]);
}

#[tokio::test]
async fn cancellations_and_sweeps_interleave_cleanly() {
    let hotel = open_hotel().await;
    let room = hotel.rooms[1];

    let mut bookings = Vec::new();
    for (i, day) in [1u32, 1, 3, 3].into_iter().enumerate() {
        let guest = hotel.guests[i % hotel.guests.len()];
        bookings.push(assert_ok!(
            hotel.engine.create_booking(stay(guest, room, d(day), d(day + 1))).await
        ));
    }
    hotel.clock.advance_days(5);

    let cancels = bookings.iter().map(|b| {
        let engine = hotel.engine.clone();
        let id = b.id;
        async move { engine.cancel_booking(id).await }
    });
    let sweep = {
        let engine = hotel.engine.clone();
        async move { engine.run_reconciliation().await }
    };
    let (cancelled, report) = tokio::join!(join_all(cancels), sweep);

    let mut completed = 0;
    for (booking, outcome) in bookings.iter().zip(&cancelled) {
        let status = assert_ok!(hotel.engine.get_booking(booking.id).await).status;
        match outcome {
            Ok(_) => assert_eq!(status, BookingStatus::Cancelled),
            Err(EngineError::NotActive { .. }) => {
                assert_eq!(status, BookingStatus::Completed);
                completed += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(report.completed, completed);

    let quiet = hotel.engine.run_reconciliation().await;
    assert_eq!(quiet.completed, 0);
    assert_eq!(quiet.rooms_recomputed, 0);
}

#[tokio::test]
async fn scheduler_serves_manual_runs_until_stopped() {
    let hotel = open_hotel().await;
    let scheduler = ReconciliationScheduler::start(
        hotel.engine.clone(),
        Cadence::Every(std::time::Duration::from_secs(3600)),
    );
    assert!(scheduler.run_now().await.is_some());
    scheduler.stop().await;
}
