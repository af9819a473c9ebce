use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Access role carried by every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Warden,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Warden => "warden",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "warden" => Some(Role::Warden),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account in the directory. Students carry the descriptive fields and an
/// optional room number; admins and wardens don't.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub student_code: Option<String>,
    pub phone: Option<String>,
    pub year: Option<i32>,
    pub branch: Option<String>,
    pub college: Option<String>,
    pub room_number: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            student_code: None,
            phone: None,
            year: None,
            branch: None,
            college: None,
            room_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A student with the mandatory academic fields filled in.
    pub fn student(
        name: impl Into<String>,
        email: impl Into<String>,
        student_code: impl Into<String>,
    ) -> Self {
        Self {
            student_code: Some(student_code.into()),
            ..Self::new(name, email, Role::Student)
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_academics(
        mut self,
        year: i32,
        branch: impl Into<String>,
        college: impl Into<String>,
    ) -> Self {
        self.year = Some(year);
        self.branch = Some(branch.into());
        self.college = Some(college.into());
        self
    }

    pub fn with_room(mut self, room_number: u32) -> Self {
        self.room_number = Some(room_number);
        self
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::Admin, Role::Warden, Role::Student] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("janitor"), None);
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Role::Warden).unwrap();
        assert_eq!(json, "\"warden\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Warden);
    }

    #[test]
    fn test_student_builder() {
        let student = User::student("Asha Rao", "asha@example.com", "ST042")
            .with_phone("9876543210")
            .with_academics(2, "CSE", "NIT Warangal")
            .with_room(12);

        assert!(student.is_student());
        assert_eq!(student.student_code.as_deref(), Some("ST042"));
        assert_eq!(student.year, Some(2));
        assert_eq!(student.room_number, Some(12));
    }

    #[test]
    fn test_staff_has_no_student_fields() {
        let warden = User::new("W. Singh", "warden@example.com", Role::Warden);
        assert!(!warden.is_student());
        assert!(warden.student_code.is_none());
        assert!(warden.room_number.is_none());
    }
}
