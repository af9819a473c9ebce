use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How long a copy stays out before it is due back.
pub const LOAN_PERIOD_DAYS: i64 = 15;

/// A title in the hostel library, possibly with multiple physical copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    /// Library catalog code, unique per title.
    pub book_code: String,
    pub title: String,
    pub author: String,
    pub price: f64,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(
        book_code: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            book_code: book_code.into(),
            title: title.into(),
            author: author.into(),
            price: 0.0,
            total_copies: 1,
            available_copies: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_copies(mut self, total: i32) -> Self {
        self.total_copies = total;
        self.available_copies = total;
        self
    }

    pub fn copies_out(&self) -> i32 {
        self.total_copies - self.available_copies
    }
}

/// Lifecycle of a single issued copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Issued,
    Returned,
    Overdue,
    Lost,
    Recovered,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Issued => "issued",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Lost => "lost",
            LoanStatus::Recovered => "recovered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "issued" => Some(LoanStatus::Issued),
            "returned" => Some(LoanStatus::Returned),
            "overdue" => Some(LoanStatus::Overdue),
            "lost" => Some(LoanStatus::Lost),
            "recovered" => Some(LoanStatus::Recovered),
            _ => None,
        }
    }

    /// A loan still counts against the book's available copies.
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Issued | LoanStatus::Overdue)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One copy issued to one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLoan {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub reminders_sent: i32,
    pub last_reminder_at: Option<DateTime<Utc>>,
}

impl BookLoan {
    /// Opens a loan issued `now`, due in [`LOAN_PERIOD_DAYS`].
    pub fn issue(book_id: Uuid, user_id: Uuid, issue_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            user_id,
            issue_date,
            due_date: issue_date + Duration::days(LOAN_PERIOD_DAYS),
            returned_at: None,
            status: LoanStatus::Issued,
            reminders_sent: 0,
            last_reminder_at: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && now > self.due_date
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_overdue(now) {
            return 0;
        }
        (now - self.due_date).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_book_defaults() {
        let book = Book::new("B001", "The Rust Programming Language", "Klabnik & Nichols");
        assert_eq!(book.total_copies, 1);
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.copies_out(), 0);
    }

    #[test]
    fn test_with_copies() {
        let book = Book::new("B002", "SICP", "Abelson & Sussman").with_copies(4);
        assert_eq!(book.total_copies, 4);
        assert_eq!(book.available_copies, 4);
    }

    #[test]
    fn test_loan_due_date() {
        let issued = Utc::now();
        let loan = BookLoan::issue(Uuid::new_v4(), Uuid::new_v4(), issued);
        assert_eq!(loan.due_date - issued, Duration::days(LOAN_PERIOD_DAYS));
        assert_eq!(loan.status, LoanStatus::Issued);
    }

    #[test]
    fn test_overdue_calculation() {
        let issued = Utc::now() - Duration::days(20);
        let loan = BookLoan::issue(Uuid::new_v4(), Uuid::new_v4(), issued);
        let now = Utc::now();

        assert!(loan.is_overdue(now));
        assert_eq!(loan.days_overdue(now), 5);
    }

    #[test]
    fn test_returned_loan_never_overdue() {
        let issued = Utc::now() - Duration::days(30);
        let mut loan = BookLoan::issue(Uuid::new_v4(), Uuid::new_v4(), issued);
        loan.status = LoanStatus::Returned;
        loan.returned_at = Some(Utc::now());

        assert!(!loan.is_overdue(Utc::now()));
        assert_eq!(loan.days_overdue(Utc::now()), 0);
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            LoanStatus::Issued,
            LoanStatus::Returned,
            LoanStatus::Overdue,
            LoanStatus::Lost,
            LoanStatus::Recovered,
        ] {
            assert_eq!(LoanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LoanStatus::parse("misplaced"), None);
    }
}
