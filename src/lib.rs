pub mod config;
pub mod directory;
pub mod engine;
pub mod inventory;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod wal;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
