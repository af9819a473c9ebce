use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Hostel,
    Food,
    Cleanliness,
    Staff,
    Internet,
    Security,
    Other,
}

impl FeedbackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Hostel => "hostel",
            FeedbackCategory::Food => "food",
            FeedbackCategory::Cleanliness => "cleanliness",
            FeedbackCategory::Staff => "staff",
            FeedbackCategory::Internet => "internet",
            FeedbackCategory::Security => "security",
            FeedbackCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hostel" => Some(FeedbackCategory::Hostel),
            "food" => Some(FeedbackCategory::Food),
            "cleanliness" => Some(FeedbackCategory::Cleanliness),
            "staff" => Some(FeedbackCategory::Staff),
            "internet" => Some(FeedbackCategory::Internet),
            "security" => Some(FeedbackCategory::Security),
            "other" => Some(FeedbackCategory::Other),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl FeedbackPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackPriority::Low => "low",
            FeedbackPriority::Medium => "medium",
            FeedbackPriority::High => "high",
            FeedbackPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(FeedbackPriority::Low),
            "medium" => Some(FeedbackPriority::Medium),
            "high" => Some(FeedbackPriority::High),
            "urgent" => Some(FeedbackPriority::Urgent),
            _ => None,
        }
    }
}

/// A complaint or comment filed by a student, optionally answered by staff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: FeedbackCategory,
    /// 1..=5.
    pub rating: i32,
    pub comment: String,
    pub anonymous: bool,
    pub response: Option<String>,
    pub responded_by: Option<Uuid>,
    pub responded_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub priority: FeedbackPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(
        user_id: Uuid,
        category: FeedbackCategory,
        rating: i32,
        comment: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            category,
            rating,
            comment: comment.into(),
            anonymous: false,
            response: None,
            responded_by: None,
            responded_at: None,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            priority: FeedbackPriority::Medium,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: FeedbackPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn status(&self) -> &'static str {
        if self.response.is_some() {
            "responded"
        } else {
            "pending"
        }
    }

    pub fn valid_rating(rating: i32) -> bool {
        (1..=5).contains(&rating)
    }
}
