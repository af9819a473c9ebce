use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A numbered room in the hostel.
///
/// `occupant_ids` and `occupancy_count` mirror each other; the count is derived
/// and must always equal the roster length. Students additionally record their
/// room on their own user record, which is the other half of the dual-write the
/// assignment synchronizer keeps consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_number: u32,
    pub capacity: u32,
    pub special_purpose: bool,
    pub purpose: String,
    /// User ids of the current occupants, in assignment order.
    pub occupant_ids: Vec<String>,
    pub occupancy_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// A regular dorm room with the given capacity and an empty roster.
    pub fn regular(room_number: u32, capacity: u32) -> Self {
        let now = Utc::now();
        Self {
            room_number,
            capacity,
            special_purpose: false,
            purpose: "Regular".to_string(),
            occupant_ids: Vec::new(),
            occupancy_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A special-purpose room. Never assignable, capacity pinned to zero.
    pub fn special(room_number: u32, purpose: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            room_number,
            capacity: 0,
            special_purpose: true,
            purpose: purpose.into(),
            occupant_ids: Vec::new(),
            occupancy_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the room can take one more student.
    pub fn is_available(&self) -> bool {
        !self.special_purpose && self.occupancy_count < self.capacity
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.special_purpose {
            write!(f, "Room {} ({})", self.room_number, self.purpose)
        } else {
            write!(
                f,
                "Room {} ({}/{})",
                self.room_number, self.occupancy_count, self.capacity
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_room() {
        let room = Room::regular(10, 6);
        assert_eq!(room.room_number, 10);
        assert_eq!(room.capacity, 6);
        assert!(!room.special_purpose);
        assert_eq!(room.purpose, "Regular");
        assert!(room.occupant_ids.is_empty());
        assert!(room.is_available());
    }

    #[test]
    fn test_special_room_never_available() {
        let room = Room::special(15, "Book Library");
        assert!(room.special_purpose);
        assert_eq!(room.capacity, 0);
        assert!(!room.is_available());
    }

    #[test]
    fn test_full_room_not_available() {
        let mut room = Room::regular(3, 2);
        room.occupant_ids = vec!["a".into(), "b".into()];
        room.occupancy_count = 2;
        assert!(!room.is_available());
    }

    #[test]
    fn test_display() {
        let room = Room::regular(4, 6);
        assert_eq!(format!("{}", room), "Room 4 (0/6)");

        let lab = Room::special(8, "Digital Lab 1");
        assert_eq!(format!("{}", lab), "Room 8 (Digital Lab 1)");
    }
}
