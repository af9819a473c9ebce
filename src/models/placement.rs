use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A campus placement record for a hostel student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    pub id: Uuid,
    pub student_name: String,
    pub branch: String,
    /// Placement year, 2020..=2030.
    pub year: i32,
    pub company: String,
    pub job_role: String,
    /// Annual package in lakhs.
    pub package_offered: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Placement {
    pub fn new(
        student_name: impl Into<String>,
        branch: impl Into<String>,
        year: i32,
        company: impl Into<String>,
        job_role: impl Into<String>,
        package_offered: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            student_name: student_name.into(),
            branch: branch.into(),
            year,
            company: company.into(),
            job_role: job_role.into(),
            package_offered,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn valid_year(year: i32) -> bool {
        (2020..=2030).contains(&year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_placement() {
        let p = Placement::new("Asha Rao", "CSE", 2025, "Acme Corp", "SDE", 12.5);
        assert_eq!(p.company, "Acme Corp");
        assert_eq!(p.year, 2025);
    }

    #[test]
    fn test_year_bounds() {
        assert!(Placement::valid_year(2020));
        assert!(Placement::valid_year(2030));
        assert!(!Placement::valid_year(2019));
        assert!(!Placement::valid_year(2031));
    }
}
