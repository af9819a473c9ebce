//! User directory endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::AppState;
use crate::assignment::AssignmentService;
use crate::db::{UserFilter, UserRepository};
use crate::models::{Role, User};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/me", get(me))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/students/{student_code}", get(get_student))
}

#[derive(Deserialize)]
struct ListParams {
    role: Option<Role>,
    year: Option<i32>,
    branch: Option<String>,
    college: Option<String>,
    room_number: Option<u32>,
    #[serde(default)]
    unassigned: bool,
}

async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require(&[Role::Warden])?;

    let users = UserRepository::new(state.pool.clone())
        .list(&UserFilter {
            role: params.role,
            year: params.year,
            branch: params.branch,
            college: params.college,
            room_number: params.room_number,
            unassigned: params.unassigned,
            ..Default::default()
        })
        .await?;
    Ok(Json(users))
}

#[derive(Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
    #[serde(default = "default_role")]
    role: Role,
    student_code: Option<String>,
    phone: Option<String>,
    year: Option<i32>,
    branch: Option<String>,
    college: Option<String>,
    room_number: Option<u32>,
}

fn default_role() -> Role {
    Role::Student
}

async fn create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    auth.require(&[])?;

    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ApiError::Validation(
            "Name and email are required".to_string(),
        ));
    }
    if req.role == Role::Student && req.student_code.is_none() {
        return Err(ApiError::Validation(
            "Students require a student code".to_string(),
        ));
    }

    let repo = UserRepository::new(state.pool.clone());
    if repo.get_by_email(&req.email).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "A user with email {} already exists",
            req.email
        )));
    }
    if let Some(code) = &req.student_code {
        if repo.get_student(code).await?.is_some() {
            return Err(ApiError::Conflict(format!(
                "A student with ID {} already exists",
                code
            )));
        }
    }

    let mut user = User::new(req.name, req.email, req.role);
    user.student_code = req.student_code;
    user.phone = req.phone;
    user.year = req.year;
    user.branch = req.branch;
    user.college = req.college;

    let created = repo.create(&user).await?;

    // Initial room placement goes through the synchronizer so roster and
    // pointer move together
    if let Some(room_number) = req.room_number {
        if created.role != Role::Student {
            return Err(ApiError::Validation(
                "Only students can be assigned to rooms".to_string(),
            ));
        }
        AssignmentService::new(state.pool.clone())
            .assign_user(created.id, room_number)
            .await?;
        let created = repo.get(created.id).await?.ok_or(sqlx::Error::RowNotFound)?;
        return Ok((StatusCode::CREATED, Json(created)));
    }

    Ok((StatusCode::CREATED, Json(created)))
}

async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    let id: Uuid = auth
        .user_id
        .parse()
        .map_err(|_| ApiError::Validation("Token carries no valid user id".to_string()))?;
    let user = UserRepository::new(state.pool.clone())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User record not found for token".to_string()))?;
    Ok(Json(user))
}

async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    auth.require(&[Role::Warden])?;

    let user = UserRepository::new(state.pool.clone())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User not found with id {}", id)))?;
    Ok(Json(user))
}

async fn get_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(student_code): Path<String>,
) -> Result<Json<User>, ApiError> {
    auth.require(&[Role::Warden])?;

    let user = UserRepository::new(state.pool.clone())
        .get_student(&student_code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Student not found with ID {}", student_code)))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    year: Option<i32>,
    branch: Option<String>,
    college: Option<String>,
    /// Some(number) moves the student, Some(0) is rejected by the room
    /// lookup, absent leaves the assignment alone.
    room_number: Option<u32>,
}

async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    auth.require(&[Role::Warden])?;

    let repo = UserRepository::new(state.pool.clone());
    let mut user = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User not found with id {}", id)))?;

    if let Some(email) = &req.email {
        if let Some(other) = repo.get_by_email(email).await? {
            if other.id != user.id {
                return Err(ApiError::Conflict(format!(
                    "A user with email {} already exists",
                    email
                )));
            }
        }
        user.email = email.clone();
    }
    if let Some(name) = req.name {
        user.name = name;
    }
    if req.phone.is_some() {
        user.phone = req.phone;
    }
    if req.year.is_some() {
        user.year = req.year;
    }
    if req.branch.is_some() {
        user.branch = req.branch;
    }
    if req.college.is_some() {
        user.college = req.college;
    }

    let updated = repo.update(&user).await?;

    // Room moves go through the synchronizer, never through a raw field write
    if let Some(room_number) = req.room_number {
        if updated.room_number != Some(room_number) {
            if updated.role != Role::Student {
                return Err(ApiError::Validation(
                    "Only students can be assigned to rooms".to_string(),
                ));
            }
            AssignmentService::new(state.pool.clone())
                .assign_user(updated.id, room_number)
                .await?;
            let updated = repo.get(id).await?.ok_or(sqlx::Error::RowNotFound)?;
            return Ok(Json(updated));
        }
    }

    Ok(Json(updated))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.require(&[])?;

    let repo = UserRepository::new(state.pool.clone());
    if repo.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User not found with id {}", id)));
    }
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
