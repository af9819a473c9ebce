//! Placement record endpoints.

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
use crate::db::{PlacementRepository, PlacementStats};
use crate::models::{Placement, Role};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/placements", get(list_placements).post(create_placement))
        .route("/api/placements/stats", get(stats))
        .route("/api/placements/by-student/{name}", get(by_student))
        .route(
            "/api/placements/{id}",
            get(get_placement).put(update_placement).delete(delete_placement),
        )
}

#[derive(Deserialize)]
struct ListParams {
    year: Option<i32>,
    branch: Option<String>,
    company: Option<String>,
}

async fn list_placements(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Placement>>, ApiError> {
    let placements = PlacementRepository::new(state.pool.clone())
        .list(params.year, params.branch.as_deref(), params.company.as_deref())
        .await?;
    Ok(Json(placements))
}

#[derive(Deserialize)]
struct PlacementRequest {
    student_name: String,
    branch: String,
    year: i32,
    company: String,
    job_role: String,
    package_offered: f64,
}

fn validate(req: &PlacementRequest) -> Result<(), ApiError> {
    if req.student_name.trim().is_empty() || req.company.trim().is_empty() {
        return Err(ApiError::Validation(
            "Student name and company are required".to_string(),
        ));
    }
    if !Placement::valid_year(req.year) {
        return Err(ApiError::Validation(format!(
            "Year {} is outside the accepted range",
            req.year
        )));
    }
    if req.package_offered < 0.0 {
        return Err(ApiError::Validation(
            "Package cannot be negative".to_string(),
        ));
    }
    Ok(())
}

async fn create_placement(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<PlacementRequest>,
) -> Result<(StatusCode, Json<Placement>), ApiError> {
    auth.require(&[])?;
    validate(&req)?;

    let placement = Placement::new(
        req.student_name,
        req.branch,
        req.year,
        req.company,
        req.job_role,
        req.package_offered,
    );
    let created = PlacementRepository::new(state.pool.clone())
        .create(&placement)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_placement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Placement>, ApiError> {
    let placement = PlacementRepository::new(state.pool.clone())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Placement not found with id {}", id)))?;
    Ok(Json(placement))
}

async fn by_student(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Placement>>, ApiError> {
    let placements = PlacementRepository::new(state.pool.clone())
        .list_by_student_name(&name)
        .await?;
    Ok(Json(placements))
}

async fn update_placement(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<PlacementRequest>,
) -> Result<Json<Placement>, ApiError> {
    auth.require(&[])?;
    validate(&req)?;

    let repo = PlacementRepository::new(state.pool.clone());
    let mut placement = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Placement not found with id {}", id)))?;

    placement.student_name = req.student_name;
    placement.branch = req.branch;
    placement.year = req.year;
    placement.company = req.company;
    placement.job_role = req.job_role;
    placement.package_offered = req.package_offered;

    let updated = repo.update(&placement).await?;
    Ok(Json(updated))
}

async fn delete_placement(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth.require(&[])?;

    let repo = PlacementRepository::new(state.pool.clone());
    if repo.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Placement not found with id {}",
            id
        )));
    }
    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(State(state): State<AppState>) -> Result<Json<PlacementStats>, ApiError> {
    let stats = PlacementRepository::new(state.pool.clone()).stats().await?;
    Ok(Json(stats))
}
