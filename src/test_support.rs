//! Fixtures shared by the unit and integration tests.
//!
//! Compiled for `cfg(test)` and behind the `test-support` feature.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use ulid::Ulid;

use crate::directory::{InMemoryDirectory, User};
use crate::engine::Engine;
use crate::notify::NotifyHub;

/// Clock whose time only moves when a test moves it.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Noon UTC on the given day.
    pub fn at(year: i32, month: u32, day: u32) -> Self {
        Self::new(Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock_clock() = now;
    }

    pub fn advance_days(&self, days: i64) {
        *self.lock_clock() += TimeDelta::days(days);
    }

    pub fn today(&self) -> NaiveDate {
        self.utc().date_naive()
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

pub fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roomledger_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

pub fn guest(directory: &InMemoryDirectory, name: &str) -> Ulid {
    let id = Ulid::new();
    directory.insert(User {
        id,
        name: name.into(),
        email: None,
    });
    id
}

/// Fresh engine on an empty WAL with one known guest. Returns the guest's id.
pub async fn test_engine(wal_name: &str, clock: Arc<MutableClock>) -> (Engine, Ulid) {
    let directory = Arc::new(InMemoryDirectory::new());
    let user = guest(&directory, "guest");
    let engine = Engine::new(
        test_wal_path(wal_name),
        Arc::new(NotifyHub::new()),
        directory,
        clock,
    )
    .unwrap();
    (engine, user)
}
