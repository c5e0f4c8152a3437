//! Startup seed of rooms and guests.
//!
//! ```json
//! {
//!   "rooms": [{ "id": "01J...", "number": "101", "capacity": 2, "price_per_night": 80.0 }],
//!   "users": [{ "id": "01J...", "name": "Ada", "email": "ada@example.com" }]
//! }
//! ```

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::info;
use ulid::Ulid;

use crate::directory::{InMemoryDirectory, User};
use crate::engine::{Engine, EngineError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomSeed {
    pub id: Ulid,
    pub number: String,
    pub capacity: u32,
    pub price_per_night: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub rooms: Vec<RoomSeed>,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Inventory {
    pub fn parse(json: &str) -> io::Result<Self> {
        serde_json::from_str(json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Register rooms the engine does not know yet and load every user.
    /// Returns how many rooms were newly registered.
    pub async fn apply(
        &self,
        engine: &Engine,
        directory: &InMemoryDirectory,
    ) -> Result<usize, EngineError> {
        for user in &self.users {
            directory.insert(user.clone());
        }
        let mut registered = 0;
        for room in &self.rooms {
            if engine.room_state(&room.id).is_some() {
                continue;
            }
            engine
                .register_room(room.id, room.number.clone(), room.capacity, room.price_per_night)
                .await?;
            registered += 1;
        }
        info!(
            "inventory: {registered} new rooms, {} users loaded",
            self.users.len()
        );
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rooms_and_users() {
        let room_id = Ulid::new();
        let user_id = Ulid::new();
        let json = format!(
            r#"{{
                "rooms": [{{"id": "{room_id}", "number": "101", "capacity": 2, "price_per_night": 80.5}}],
                "users": [{{"id": "{user_id}", "name": "Ada"}}]
            }}"#
        );
        let inv = Inventory::parse(&json).unwrap();
        assert_eq!(inv.rooms.len(), 1);
        assert_eq!(inv.rooms[0].id, room_id);
        assert_eq!(inv.rooms[0].price_per_night, 80.5);
        assert_eq!(inv.users[0].id, user_id);
        assert_eq!(inv.users[0].email, None);
    }

    #[test]
    fn empty_object_is_empty_inventory() {
        assert_eq!(Inventory::parse("{}").unwrap(), Inventory::default());
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let err = Inventory::parse("{ rooms: ").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
