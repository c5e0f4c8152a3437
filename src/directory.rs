use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Lookup for guests. Registration and credentials live elsewhere;
/// the engine only needs to know a user exists.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Ulid) -> Option<User>;
}

/// Directory backed by a concurrent map, seeded from the inventory file.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<Ulid, User>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_user(&self, id: Ulid) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }
}
