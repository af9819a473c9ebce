//! Book catalog and loan endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::AppState;
use crate::db::{BookRepository, LoanFilter, UserRepository};
use crate::models::{Book, BookLoan, LoanStatus, Role};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/books", get(list_books).post(create_book))
        .route("/api/books/my-books", get(my_books))
        .route(
            "/api/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/api/books/{id}/issue/{student_code}", post(issue_book))
        .route("/api/loans", get(list_loans))
        .route("/api/loans/overdue", get(list_overdue))
        .route("/api/loans/check-overdue", post(check_overdue))
        .route("/api/loans/{id}/return", post(return_loan))
        .route("/api/loans/{id}/lost", post(lose_loan))
        .route("/api/loans/{id}/recover", post(recover_loan))
        .route("/api/students/{student_code}/loans", get(student_loans))
}

#[derive(Deserialize)]
struct ListParams {
    title: Option<String>,
    author: Option<String>,
    available: Option<bool>,
}

async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Book>>, ApiError> {
    let books = BookRepository::new(state.pool.clone())
        .list(
            params.title.as_deref(),
            params.author.as_deref(),
            params.available,
        )
        .await?;
    Ok(Json(books))
}

#[derive(Deserialize)]
struct CreateBookRequest {
    book_code: String,
    title: String,
    author: String,
    price: Option<f64>,
    copies: Option<i32>,
}

async fn create_book(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    auth.require(&[Role::Warden])?;

    if req.book_code.trim().is_empty() || req.title.trim().is_empty() {
        return Err(ApiError::Validation(
            "Book code and title are required".to_string(),
        ));
    }
    if let Some(copies) = req.copies {
        if copies < 1 {
            return Err(ApiError::Validation(
                "A book must have at least one copy".to_string(),
            ));
        }
    }

    let repo = BookRepository::new(state.pool.clone());
    if repo.get_by_code(&req.book_code).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "A book with code {} already exists",
            req.book_code
        )));
    }

    let mut book = Book::new(req.book_code, req.title, req.author);
    if let Some(price) = req.price {
        book = book.with_price(price);
    }
    if let Some(copies) = req.copies {
        book = book.with_copies(copies);
    }

    let created = repo.create(&book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn fetch_book(state: &AppState, id: Uuid) -> Result<Book, ApiError> {
    BookRepository::new(state.pool.clone())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book not found with id {}", id)))
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Book>, ApiError> {
    Ok(Json(fetch_book(&state, id).await?))
}

#[derive(Deserialize)]
struct UpdateBookRequest {
    book_code: Option<String>,
    title: Option<String>,
    author: Option<String>,
    price: Option<f64>,
    total_copies: Option<i32>,
}

async fn update_book(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBookRequest>,
) -> Result<Json<Book>, ApiError> {
    auth.require(&[Role::Warden])?;

    let repo = BookRepository::new(state.pool.clone());
    let mut book = fetch_book(&state, id).await?;
    let copies_out = book.copies_out();

    if let Some(code) = req.book_code {
        if code != book.book_code {
            if copies_out > 0 {
                return Err(ApiError::Conflict(
                    "Book code cannot change while copies are issued".to_string(),
                ));
            }
            if repo.get_by_code(&code).await?.is_some() {
                return Err(ApiError::Conflict(format!(
                    "A book with code {} already exists",
                    code
                )));
            }
            book.book_code = code;
        }
    }
    if let Some(title) = req.title {
        book.title = title;
    }
    if let Some(author) = req.author {
        book.author = author;
    }
    if let Some(price) = req.price {
        book.price = price;
    }
    if let Some(total) = req.total_copies {
        if total < copies_out {
            return Err(ApiError::Conflict(format!(
                "{} copies are out; total cannot drop below that",
                copies_out
            )));
        }
        book.available_copies = total - copies_out;
        book.total_copies = total;
    }

    let updated = repo.update(&book).await?;
    Ok(Json(updated))
}

async fn delete_book(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.require(&[])?;

    let book = fetch_book(&state, id).await?;
    if book.copies_out() > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete {}: {} copies are still issued",
            book.title,
            book.copies_out()
        )));
    }
    BookRepository::new(state.pool.clone()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn issue_book(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((id, student_code)): Path<(Uuid, String)>,
) -> Result<(StatusCode, Json<BookLoan>), ApiError> {
    auth.require(&[Role::Warden])?;

    let book = fetch_book(&state, id).await?;
    if book.available_copies < 1 {
        return Err(ApiError::Conflict(format!(
            "No copies of {} are available",
            book.title
        )));
    }

    let student = UserRepository::new(state.pool.clone())
        .get_student(&student_code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Student not found with ID {}", student_code)))?;

    let repo = BookRepository::new(state.pool.clone());
    let open = repo
        .list_loans(&LoanFilter {
            open_only: true,
            user_id: Some(student.id),
            ..Default::default()
        })
        .await?;
    if open.iter().any(|loan| loan.book_id == book.id) {
        return Err(ApiError::Conflict(format!(
            "{} already has this book issued",
            student.name
        )));
    }

    let loan = repo
        .issue(&BookLoan::issue(book.id, student.id, Utc::now()))
        .await?;

    tracing::info!(book = %book.title, student = %student.name, "book issued");
    Ok((StatusCode::CREATED, Json(loan)))
}

#[derive(Deserialize)]
struct LoanParams {
    status: Option<String>,
    #[serde(default)]
    open: bool,
}

async fn list_loans(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<LoanParams>,
) -> Result<Json<Vec<BookLoan>>, ApiError> {
    auth.require(&[Role::Warden])?;

    let status = match params.status.as_deref() {
        Some(s) => Some(
            LoanStatus::parse(s)
                .ok_or_else(|| ApiError::Validation(format!("Unknown loan status {}", s)))?,
        ),
        None => None,
    };

    let loans = BookRepository::new(state.pool.clone())
        .list_loans(&LoanFilter {
            status,
            open_only: params.open,
            user_id: None,
        })
        .await?;
    Ok(Json(loans))
}

async fn list_overdue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<BookLoan>>, ApiError> {
    auth.require(&[Role::Warden])?;

    let loans = BookRepository::new(state.pool.clone())
        .list_loans(&LoanFilter {
            status: Some(LoanStatus::Overdue),
            ..Default::default()
        })
        .await?;
    Ok(Json(loans))
}

#[derive(Serialize)]
struct SweepResponse {
    marked_overdue: u64,
    reminders_recorded: u64,
}

async fn check_overdue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<SweepResponse>, ApiError> {
    auth.require(&[Role::Warden])?;

    let (marked, reminded) = BookRepository::new(state.pool.clone())
        .sweep_overdue(Utc::now())
        .await?;
    Ok(Json(SweepResponse {
        marked_overdue: marked,
        reminders_recorded: reminded,
    }))
}

async fn fetch_loan(state: &AppState, id: Uuid) -> Result<BookLoan, ApiError> {
    BookRepository::new(state.pool.clone())
        .get_loan(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Loan not found with id {}", id)))
}

async fn return_loan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookLoan>, ApiError> {
    auth.require(&[Role::Warden])?;

    let loan = fetch_loan(&state, id).await?;
    if !loan.status.is_open() {
        return Err(ApiError::Conflict(format!(
            "Loan is already {}",
            loan.status
        )));
    }

    let closed = BookRepository::new(state.pool.clone())
        .close_loan(id, LoanStatus::Returned, Utc::now())
        .await?;
    Ok(Json(closed))
}

async fn lose_loan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookLoan>, ApiError> {
    auth.require(&[Role::Warden])?;

    let loan = fetch_loan(&state, id).await?;
    if !loan.status.is_open() {
        return Err(ApiError::Conflict(format!(
            "Loan is already {}",
            loan.status
        )));
    }

    let lost = BookRepository::new(state.pool.clone()).mark_lost(id).await?;
    Ok(Json(lost))
}

async fn recover_loan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookLoan>, ApiError> {
    auth.require(&[Role::Warden])?;

    let loan = fetch_loan(&state, id).await?;
    if loan.status != LoanStatus::Lost {
        return Err(ApiError::Conflict(
            "Only lost books can be recovered".to_string(),
        ));
    }

    // Recovery puts the copy back in the pool, same as a return
    let recovered = BookRepository::new(state.pool.clone())
        .close_loan(id, LoanStatus::Recovered, Utc::now())
        .await?;
    Ok(Json(recovered))
}

async fn student_loans(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(student_code): Path<String>,
) -> Result<Json<Vec<BookLoan>>, ApiError> {
    auth.require(&[Role::Warden])?;

    let student = UserRepository::new(state.pool.clone())
        .get_student(&student_code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Student not found with ID {}", student_code)))?;

    let loans = BookRepository::new(state.pool.clone())
        .list_loans(&LoanFilter {
            user_id: Some(student.id),
            ..Default::default()
        })
        .await?;
    Ok(Json(loans))
}

async fn my_books(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<BookLoan>>, ApiError> {
    auth.require(&[Role::Student])?;

    let id: Uuid = auth
        .user_id
        .parse()
        .map_err(|_| ApiError::Validation("Token carries no valid user id".to_string()))?;

    let loans = BookRepository::new(state.pool.clone())
        .list_loans(&LoanFilter {
            open_only: true,
            user_id: Some(id),
            ..Default::default()
        })
        .await?;
    Ok(Json(loans))
}
