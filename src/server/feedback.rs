//! Feedback endpoints.

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
use crate::db::{FeedbackRepository, FeedbackStats};
use crate::models::{Feedback, FeedbackCategory, FeedbackPriority, Role};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/feedback", get(list_feedback).post(create_feedback))
        .route("/api/feedback/stats", get(stats))
        .route("/api/feedback/my-feedback", get(my_feedback))
        .route(
            "/api/feedback/{id}",
            get(get_feedback).delete(delete_feedback),
        )
        .route("/api/feedback/{id}/respond", post(respond))
        .route("/api/feedback/{id}/resolve", post(resolve))
}

/// Feedback as served to clients; the author is blanked on anonymous entries.
#[derive(Serialize)]
struct FeedbackView {
    #[serde(flatten)]
    feedback: Feedback,
    status: &'static str,
}

fn view(mut feedback: Feedback) -> FeedbackView {
    if feedback.anonymous {
        feedback.user_id = Uuid::nil();
    }
    let status = feedback.status();
    FeedbackView { feedback, status }
}

fn caller_id(auth: &AuthUser) -> Result<Uuid, ApiError> {
    auth.user_id
        .parse()
        .map_err(|_| ApiError::Validation("Token carries no valid user id".to_string()))
}

#[derive(Deserialize)]
struct ListParams {
    category: Option<String>,
    resolved: Option<bool>,
}

async fn list_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<FeedbackView>>, ApiError> {
    auth.require(&[Role::Warden])?;

    let category = match params.category.as_deref() {
        Some(c) => Some(
            FeedbackCategory::parse(c)
                .ok_or_else(|| ApiError::Validation(format!("Unknown category {}", c)))?,
        ),
        None => None,
    };

    let entries = FeedbackRepository::new(state.pool.clone())
        .list(category, params.resolved, None)
        .await?;
    Ok(Json(entries.into_iter().map(view).collect()))
}

#[derive(Deserialize)]
struct CreateFeedbackRequest {
    category: String,
    rating: i32,
    comment: String,
    #[serde(default)]
    anonymous: bool,
    priority: Option<String>,
}

async fn create_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackView>), ApiError> {
    auth.require(&[Role::Student])?;

    let category = FeedbackCategory::parse(&req.category)
        .ok_or_else(|| ApiError::Validation(format!("Unknown category {}", req.category)))?;
    if !Feedback::valid_rating(req.rating) {
        return Err(ApiError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if req.comment.trim().is_empty() {
        return Err(ApiError::Validation("Comment is required".to_string()));
    }

    let mut feedback = Feedback::new(caller_id(&auth)?, category, req.rating, req.comment);
    if let Some(p) = req.priority.as_deref() {
        let priority = FeedbackPriority::parse(p)
            .ok_or_else(|| ApiError::Validation(format!("Unknown priority {}", p)))?;
        feedback = feedback.with_priority(priority);
    }
    if req.anonymous {
        feedback = feedback.anonymous();
    }

    let created = FeedbackRepository::new(state.pool.clone())
        .create(&feedback)
        .await?;
    Ok((StatusCode::CREATED, Json(view(created))))
}

async fn fetch(state: &AppState, id: Uuid) -> Result<Feedback, ApiError> {
    FeedbackRepository::new(state.pool.clone())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Feedback not found with id {}", id)))
}

async fn get_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackView>, ApiError> {
    let feedback = fetch(&state, id).await?;
    if auth.role == Role::Student && feedback.user_id != caller_id(&auth)? {
        return Err(ApiError::Forbidden(
            "You can only view your own feedback".to_string(),
        ));
    }
    Ok(Json(view(feedback)))
}

async fn my_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<FeedbackView>>, ApiError> {
    auth.require(&[Role::Student])?;

    let entries = FeedbackRepository::new(state.pool.clone())
        .list(None, None, Some(caller_id(&auth)?))
        .await?;
    // The author always sees their own entries un-blanked
    let views = entries
        .into_iter()
        .map(|f| {
            let status = f.status();
            FeedbackView {
                feedback: f,
                status,
            }
        })
        .collect();
    Ok(Json(views))
}

#[derive(Deserialize)]
struct RespondRequest {
    response: String,
}

async fn respond(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<FeedbackView>, ApiError> {
    auth.require(&[Role::Warden])?;

    if req.response.trim().is_empty() {
        return Err(ApiError::Validation("Response is required".to_string()));
    }
    fetch(&state, id).await?;

    let updated = FeedbackRepository::new(state.pool.clone())
        .respond(id, &req.response, caller_id(&auth)?, Utc::now())
        .await?;
    Ok(Json(view(updated)))
}

async fn resolve(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<FeedbackView>, ApiError> {
    auth.require(&[Role::Warden])?;

    let feedback = fetch(&state, id).await?;
    if feedback.resolved {
        return Err(ApiError::Conflict(
            "Feedback is already resolved".to_string(),
        ));
    }

    let updated = FeedbackRepository::new(state.pool.clone())
        .resolve(id, caller_id(&auth)?, Utc::now())
        .await?;
    Ok(Json(view(updated)))
}

async fn delete_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let feedback = fetch(&state, id).await?;

    // Authors may retract their own entries; otherwise admin only
    if feedback.user_id != caller_id(&auth)? {
        auth.require(&[])?;
    }

    FeedbackRepository::new(state.pool.clone()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<FeedbackStats>, ApiError> {
    auth.require(&[Role::Warden])?;

    let stats = FeedbackRepository::new(state.pool.clone()).stats().await?;
    Ok(Json(stats))
}
