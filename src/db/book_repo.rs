use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::room_repo::parse_timestamp;
use crate::models::{Book, BookLoan, LoanStatus};

/// Reminders are spaced at least this many days apart.
const REMINDER_SPACING_DAYS: i64 = 3;

/// Query filters for loan listing.
#[derive(Debug, Default, Clone)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    /// Only loans still counting against available copies (issued or overdue).
    pub open_only: bool,
    pub user_id: Option<Uuid>,
}

pub struct BookRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: String,
    book_code: String,
    title: String,
    author: String,
    price: f64,
    total_copies: i64,
    available_copies: i64,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct LoanRow {
    id: String,
    book_id: String,
    user_id: String,
    issue_date: String,
    due_date: String,
    returned_at: Option<String>,
    status: String,
    reminders_sent: i64,
    last_reminder_at: Option<String>,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, book: &Book) -> Result<Book, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO books (id, book_code, title, author, price, total_copies, available_copies, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(book.id.to_string())
        .bind(&book.book_code)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.price)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.created_at.to_rfc3339())
        .bind(book.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(book.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Book>, sqlx::Error> {
        let row: Option<BookRow> = sqlx::query_as("SELECT * FROM books WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_book))
    }

    pub async fn get_by_code(&self, book_code: &str) -> Result<Option<Book>, sqlx::Error> {
        let row: Option<BookRow> = sqlx::query_as("SELECT * FROM books WHERE book_code = ?")
            .bind(book_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_book))
    }

    pub async fn list(
        &self,
        title: Option<&str>,
        author: Option<&str>,
        available: Option<bool>,
    ) -> Result<Vec<Book>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM books WHERE 1=1");
        if title.is_some() {
            sql.push_str(" AND title LIKE '%' || ? || '%'");
        }
        if author.is_some() {
            sql.push_str(" AND author LIKE '%' || ? || '%'");
        }
        if let Some(available) = available {
            if available {
                sql.push_str(" AND available_copies > 0");
            } else {
                sql.push_str(" AND available_copies = 0");
            }
        }
        sql.push_str(" ORDER BY title");

        let mut query = sqlx::query_as::<_, BookRow>(&sql);
        if let Some(title) = title {
            query = query.bind(title);
        }
        if let Some(author) = author {
            query = query.bind(author);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(hydrate_book).collect())
    }

    pub async fn update(&self, book: &Book) -> Result<Book, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE books
            SET book_code = ?, title = ?, author = ?, price = ?, total_copies = ?,
                available_copies = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&book.book_code)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.price)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(Utc::now().to_rfc3339())
        .bind(book.id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(book.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        // CASCADE removes the loan history
        sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Issue one copy to a student: decrement availability and open the loan in
    /// a single transaction. The caller has already checked availability.
    pub async fn issue(&self, loan: &BookLoan) -> Result<BookLoan, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(loan.book_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO book_loans (id, book_id, user_id, issue_date, due_date, returned_at, status, reminders_sent, last_reminder_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, 0, NULL)
            "#,
        )
        .bind(loan.id.to_string())
        .bind(loan.book_id.to_string())
        .bind(loan.user_id.to_string())
        .bind(loan.issue_date.to_rfc3339())
        .bind(loan.due_date.to_rfc3339())
        .bind(loan.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_loan(loan.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_loan(&self, id: Uuid) -> Result<Option<BookLoan>, sqlx::Error> {
        let row: Option<LoanRow> = sqlx::query_as("SELECT * FROM book_loans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_loan))
    }

    pub async fn list_loans(&self, filter: &LoanFilter) -> Result<Vec<BookLoan>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM book_loans WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.open_only {
            sql.push_str(" AND status IN ('issued', 'overdue')");
        }
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        sql.push_str(" ORDER BY issue_date DESC");

        let mut query = sqlx::query_as::<_, LoanRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(hydrate_loan).collect())
    }

    /// Close a loan (returned or recovered), giving the copy back to the pool.
    pub async fn close_loan(
        &self,
        loan_id: Uuid,
        status: LoanStatus,
        returned_at: DateTime<Utc>,
    ) -> Result<BookLoan, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let book_id: (String,) = sqlx::query_as("SELECT book_id FROM book_loans WHERE id = ?")
            .bind(loan_id.to_string())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE book_loans SET status = ?, returned_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(returned_at.to_rfc3339())
            .bind(loan_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&book_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_loan(loan_id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Mark a loan lost. The copy stays out of the pool until recovered.
    pub async fn mark_lost(&self, loan_id: Uuid) -> Result<BookLoan, sqlx::Error> {
        sqlx::query("UPDATE book_loans SET status = 'lost' WHERE id = ?")
            .bind(loan_id.to_string())
            .execute(&self.pool)
            .await?;
        self.get_loan(loan_id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Overdue sweep: flip late issued loans to overdue and bump the reminder
    /// counter on overdue loans not reminded in the last few days. Returns
    /// (newly overdue, reminders recorded).
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<(u64, u64), sqlx::Error> {
        let marked = sqlx::query(
            "UPDATE book_loans SET status = 'overdue' WHERE status = 'issued' AND due_date < ?",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let reminder_cutoff = now - Duration::days(REMINDER_SPACING_DAYS);
        let reminded = sqlx::query(
            r#"
            UPDATE book_loans
            SET reminders_sent = reminders_sent + 1, last_reminder_at = ?
            WHERE status = 'overdue' AND (last_reminder_at IS NULL OR last_reminder_at < ?)
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(reminder_cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok((marked, reminded))
    }
}

fn hydrate_book(row: BookRow) -> Book {
    Book {
        id: Uuid::parse_str(&row.id).unwrap_or_default(),
        book_code: row.book_code,
        title: row.title,
        author: row.author,
        price: row.price,
        total_copies: row.total_copies as i32,
        available_copies: row.available_copies as i32,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

fn hydrate_loan(row: LoanRow) -> BookLoan {
    BookLoan {
        id: Uuid::parse_str(&row.id).unwrap_or_default(),
        book_id: Uuid::parse_str(&row.book_id).unwrap_or_default(),
        user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
        issue_date: parse_timestamp(&row.issue_date),
        due_date: parse_timestamp(&row.due_date),
        returned_at: row.returned_at.as_deref().map(parse_timestamp),
        status: LoanStatus::parse(&row.status).unwrap_or(LoanStatus::Issued),
        reminders_sent: row.reminders_sent as i32,
        last_reminder_at: row.last_reminder_at.as_deref().map(parse_timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: BookRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            repo: BookRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_book() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let book = Book::new("B001", "Dune", "Frank Herbert")
            .with_price(450.0)
            .with_copies(3);
        let created = repo.create(&book).await.unwrap();
        assert_eq!(created.title, "Dune");
        assert_eq!(created.available_copies, 3);

        let by_code = repo.get_by_code("B001").await.unwrap().unwrap();
        assert_eq!(by_code.id, book.id);
    }

    #[tokio::test]
    async fn test_duplicate_book_code_rejected() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Book::new("B001", "A", "X")).await.unwrap();
        assert!(repo.create(&Book::new("B001", "B", "Y")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Book::new("B001", "Dune", "Frank Herbert"))
            .await
            .unwrap();
        repo.create(&Book::new("B002", "Dune Messiah", "Frank Herbert"))
            .await
            .unwrap();
        repo.create(&Book::new("B003", "Neuromancer", "William Gibson"))
            .await
            .unwrap();

        let dunes = repo.list(Some("dune"), None, None).await.unwrap();
        // LIKE is case-insensitive for ASCII in SQLite
        assert_eq!(dunes.len(), 2);

        let gibson = repo.list(None, Some("Gibson"), None).await.unwrap();
        assert_eq!(gibson.len(), 1);
    }

    #[tokio::test]
    async fn test_issue_and_return_cycle() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let book = Book::new("B001", "Dune", "Frank Herbert").with_copies(2);
        repo.create(&book).await.unwrap();

        let student = Uuid::new_v4();
        let loan = BookLoan::issue(book.id, student, Utc::now());
        let issued = repo.issue(&loan).await.unwrap();
        assert_eq!(issued.status, LoanStatus::Issued);

        let after_issue = repo.get(book.id).await.unwrap().unwrap();
        assert_eq!(after_issue.available_copies, 1);

        let returned = repo
            .close_loan(loan.id, LoanStatus::Returned, Utc::now())
            .await
            .unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert!(returned.returned_at.is_some());

        let after_return = repo.get(book.id).await.unwrap().unwrap();
        assert_eq!(after_return.available_copies, 2);
    }

    #[tokio::test]
    async fn test_lost_and_recover() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let book = Book::new("B001", "Dune", "Frank Herbert");
        repo.create(&book).await.unwrap();

        let loan = BookLoan::issue(book.id, Uuid::new_v4(), Utc::now());
        repo.issue(&loan).await.unwrap();

        let lost = repo.mark_lost(loan.id).await.unwrap();
        assert_eq!(lost.status, LoanStatus::Lost);
        // Copy stays out while lost
        assert_eq!(repo.get(book.id).await.unwrap().unwrap().available_copies, 0);

        let recovered = repo
            .close_loan(loan.id, LoanStatus::Recovered, Utc::now())
            .await
            .unwrap();
        assert_eq!(recovered.status, LoanStatus::Recovered);
        assert_eq!(repo.get(book.id).await.unwrap().unwrap().available_copies, 1);
    }

    #[tokio::test]
    async fn test_sweep_overdue() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let book = Book::new("B001", "Dune", "Frank Herbert").with_copies(2);
        repo.create(&book).await.unwrap();

        // One loan 20 days old (overdue), one fresh
        let late = BookLoan::issue(book.id, Uuid::new_v4(), Utc::now() - Duration::days(20));
        let fresh = BookLoan::issue(book.id, Uuid::new_v4(), Utc::now());
        repo.issue(&late).await.unwrap();
        repo.issue(&fresh).await.unwrap();

        let (marked, reminded) = repo.sweep_overdue(Utc::now()).await.unwrap();
        assert_eq!(marked, 1);
        assert_eq!(reminded, 1);

        let late_after = repo.get_loan(late.id).await.unwrap().unwrap();
        assert_eq!(late_after.status, LoanStatus::Overdue);
        assert_eq!(late_after.reminders_sent, 1);

        let fresh_after = repo.get_loan(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_after.status, LoanStatus::Issued);

        // Second sweep inside the reminder window changes nothing
        let (marked, reminded) = repo.sweep_overdue(Utc::now()).await.unwrap();
        assert_eq!(marked, 0);
        assert_eq!(reminded, 0);
    }

    #[tokio::test]
    async fn test_list_loans_by_user() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let book = Book::new("B001", "Dune", "Frank Herbert").with_copies(3);
        repo.create(&book).await.unwrap();

        let student = Uuid::new_v4();
        repo.issue(&BookLoan::issue(book.id, student, Utc::now()))
            .await
            .unwrap();
        repo.issue(&BookLoan::issue(book.id, Uuid::new_v4(), Utc::now()))
            .await
            .unwrap();

        let mine = repo
            .list_loans(&LoanFilter {
                user_id: Some(student),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        let open = repo
            .list_loans(&LoanFilter {
                open_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 2);
    }
}
