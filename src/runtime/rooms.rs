//! Room registry.
//!
//! Pure in-memory index of room name to member connection ids. Rooms are
//! created on demand up to a fixed count and are never destroyed; the
//! default room exists from the start.

use std::fmt;

/// Room every connection starts in.
pub const DEFAULT_ROOM: &str = "general";

/// A named broadcast domain.
#[derive(Debug, Clone)]
pub struct Room {
    name: String,
    members: Vec<usize>,
    max_members: usize,
}

impl Room {
    fn new(name: &str, max_members: usize) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            max_members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, conn_id: usize) -> bool {
        self.members.contains(&conn_id)
    }

    /// Whether `conn_id` could be added right now.
    pub fn has_room_for(&self, conn_id: usize) -> bool {
        self.contains(conn_id) || self.members.len() < self.max_members
    }

    /// Add a member. Adding an existing member is a no-op.
    pub fn add_member(&mut self, conn_id: usize) -> Result<(), RoomError> {
        if self.contains(conn_id) {
            return Ok(());
        }
        if !self.has_room_for(conn_id) {
            return Err(RoomError::RoomFull {
                room: self.name.clone(),
            });
        }
        self.members.push(conn_id);
        Ok(())
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove_member(&mut self, conn_id: usize) -> bool {
        match self.members.iter().position(|&id| id == conn_id) {
            Some(pos) => {
                self.members.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// All rooms, in creation order.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Vec<Room>,
    max_rooms: usize,
    max_members: usize,
}

impl RoomRegistry {
    /// Create the registry with the default room already present.
    pub fn new(max_rooms: usize, max_members: usize) -> Self {
        let mut rooms = Vec::with_capacity(max_rooms.max(1));
        rooms.push(Room::new(DEFAULT_ROOM, max_members));
        Self {
            rooms,
            max_rooms: max_rooms.max(1),
            max_members,
        }
    }

    #[cfg(test)]
    pub fn find(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|room| room.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|room| room.name == name)
    }

    /// Create a new empty room. Fails without side effects at capacity.
    ///
    /// Names are not re-checked; use [`get_or_create`](Self::get_or_create).
    pub fn create(&mut self, name: &str) -> Result<&mut Room, RoomError> {
        if self.rooms.len() >= self.max_rooms {
            return Err(RoomError::AtCapacity {
                max_rooms: self.max_rooms,
            });
        }
        self.rooms.push(Room::new(name, self.max_members));
        let idx = self.rooms.len() - 1;
        Ok(&mut self.rooms[idx])
    }

    /// Find `name`, creating it if it does not exist yet.
    pub fn get_or_create(&mut self, name: &str) -> Result<&mut Room, RoomError> {
        match self.rooms.iter().position(|room| room.name == name) {
            Some(idx) => Ok(&mut self.rooms[idx]),
            None => self.create(name),
        }
    }

    /// Remove `conn_id` from room `name` if both exist.
    pub fn remove_member(&mut self, name: &str, conn_id: usize) -> bool {
        self.find_mut(name)
            .map(|room| room.remove_member(conn_id))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}

/// Room registry errors. Reported to the requester, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// The registry already holds its maximum number of rooms.
    AtCapacity { max_rooms: usize },
    /// The room already holds its maximum number of members.
    RoomFull { room: String },
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::AtCapacity { max_rooms } => {
                write!(f, "room limit of {max_rooms} reached")
            }
            RoomError::RoomFull { room } => write!(f, "room '{room}' is full"),
        }
    }
}

impl std::error::Error for RoomError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_room_exists() {
        let registry = RoomRegistry::new(10, 100);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(DEFAULT_ROOM).unwrap().member_count(), 0);
        assert!(registry.find("code").is_none());
    }

    #[test]
    fn test_add_member_idempotent() {
        let mut registry = RoomRegistry::new(10, 100);
        let general = registry.find_mut(DEFAULT_ROOM).unwrap();

        general.add_member(3).unwrap();
        general.add_member(3).unwrap();
        assert_eq!(general.member_count(), 1);
        assert!(general.contains(3));

        assert!(general.remove_member(3));
        assert!(!general.remove_member(3));
        assert_eq!(general.member_count(), 0);
    }

    #[test]
    fn test_room_full() {
        let mut registry = RoomRegistry::new(10, 2);
        let room = registry.get_or_create("code").unwrap();

        room.add_member(1).unwrap();
        room.add_member(2).unwrap();
        assert!(room.has_room_for(2));
        assert!(!room.has_room_for(3));
        assert_eq!(
            room.add_member(3),
            Err(RoomError::RoomFull {
                room: "code".into()
            })
        );
        // Re-adding an existing member is still fine when full.
        room.add_member(1).unwrap();
        assert_eq!(room.member_count(), 2);
    }

    #[test]
    fn test_create_at_capacity() {
        let mut registry = RoomRegistry::new(3, 100);
        registry.create("a").unwrap();
        registry.create("b").unwrap();

        assert_eq!(
            registry.create("c").unwrap_err(),
            RoomError::AtCapacity { max_rooms: 3 }
        );
        assert_eq!(registry.len(), 3);
        assert!(registry.find("c").is_none());

        // Existing rooms are still reachable at capacity.
        assert!(registry.get_or_create("a").is_ok());
    }

    #[test]
    fn test_creation_order() {
        let mut registry = RoomRegistry::new(10, 100);
        registry.get_or_create("code").unwrap();
        registry.get_or_create("random").unwrap();
        registry.get_or_create("code").unwrap();

        let names: Vec<&str> = registry.iter().map(Room::name).collect();
        assert_eq!(names, vec!["general", "code", "random"]);
    }

    #[test]
    fn test_remove_member_by_name() {
        let mut registry = RoomRegistry::new(10, 100);
        registry.get_or_create("code").unwrap().add_member(5).unwrap();

        assert!(registry.remove_member("code", 5));
        assert!(!registry.remove_member("code", 5));
        assert!(!registry.remove_member("missing", 5));
    }
}
