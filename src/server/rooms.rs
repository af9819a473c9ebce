//! Room registry and assignment endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::error::ApiError;
use super::AppState;
use crate::assignment::{AssignmentService, ReconcileReport};
use crate::db::{RoomFilter, RoomRepository, UserFilter, UserRepository};
use crate::models::{Role, Room, User};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/rooms", get(list_rooms).post(create_room))
        .route("/api/rooms/occupants", delete(unassign_all))
        .route("/api/rooms/reconcile", post(reconcile))
        .route("/api/rooms/my-room", get(my_room))
        .route("/api/rooms/my-roommates", get(my_roommates))
        .route(
            "/api/rooms/{room_number}",
            get(get_room).put(update_room).delete(delete_room),
        )
        .route("/api/rooms/{room_number}/students", get(room_students))
        .route(
            "/api/rooms/{room_number}/assign/{student_code}",
            post(assign_student),
        )
        .route(
            "/api/rooms/{room_number}/remove/{student_code}",
            delete(remove_student),
        )
}

#[derive(Deserialize)]
struct ListParams {
    special_purpose: Option<bool>,
    purpose: Option<String>,
    available: Option<bool>,
    #[serde(default)]
    include_students: bool,
}

/// Room plus (optionally) the resolved occupant records.
#[derive(Serialize)]
struct RoomView {
    #[serde(flatten)]
    room: Room,
    #[serde(skip_serializing_if = "Option::is_none")]
    students: Option<Vec<OccupantView>>,
}

#[derive(Serialize)]
struct OccupantView {
    id: String,
    name: String,
    student_code: Option<String>,
    year: Option<i32>,
    branch: Option<String>,
}

impl From<User> for OccupantView {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            student_code: user.student_code,
            year: user.year,
            branch: user.branch,
        }
    }
}

async fn occupants_of(state: &AppState, room_number: u32) -> Result<Vec<OccupantView>, ApiError> {
    let users = UserRepository::new(state.pool.clone())
        .list(&UserFilter {
            room_number: Some(room_number),
            ..Default::default()
        })
        .await?;
    Ok(users.into_iter().map(OccupantView::from).collect())
}

async fn list_rooms(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RoomView>>, ApiError> {
    let repo = RoomRepository::new(state.pool.clone());
    let rooms = repo
        .list(&RoomFilter {
            special_purpose: params.special_purpose,
            purpose: params.purpose,
            available: params.available,
        })
        .await?;

    let mut views = Vec::with_capacity(rooms.len());
    for room in rooms {
        let students = if params.include_students && !room.special_purpose {
            Some(occupants_of(&state, room.room_number).await?)
        } else {
            None
        };
        views.push(RoomView { room, students });
    }
    Ok(Json(views))
}

#[derive(Deserialize)]
struct CreateRoomRequest {
    room_number: u32,
    capacity: Option<u32>,
}

async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    auth.require(&[Role::Warden])?;

    if !state.layout.contains(req.room_number) {
        return Err(ApiError::Validation(format!(
            "Room number must be between {} and {}",
            state.layout.first_room, state.layout.last_room
        )));
    }

    let repo = RoomRepository::new(state.pool.clone());
    if repo.get(req.room_number).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Room {} already exists",
            req.room_number
        )));
    }

    // Whether a room is special is fixed by the layout, not the request
    let room = match state.layout.special_purpose(req.room_number) {
        Some(purpose) => Room::special(req.room_number, purpose),
        None => {
            let capacity = req.capacity.unwrap_or(state.layout.default_capacity);
            if capacity == 0 || capacity > state.layout.default_capacity {
                return Err(ApiError::Validation(format!(
                    "Capacity must be between 1 and {}",
                    state.layout.default_capacity
                )));
            }
            Room::regular(req.room_number, capacity)
        }
    };

    let created = repo.create(&room).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_room(
    State(state): State<AppState>,
    Path(room_number): Path<u32>,
) -> Result<Json<RoomView>, ApiError> {
    let repo = RoomRepository::new(state.pool.clone());
    let room = repo
        .get(room_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Room not found with number {}", room_number)))?;

    let students = if room.special_purpose {
        None
    } else {
        Some(occupants_of(&state, room_number).await?)
    };
    Ok(Json(RoomView { room, students }))
}

#[derive(Deserialize)]
struct UpdateRoomRequest {
    capacity: u32,
}

async fn update_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_number): Path<u32>,
    Json(req): Json<UpdateRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    auth.require(&[Role::Warden])?;

    let repo = RoomRepository::new(state.pool.clone());
    let room = repo
        .get(room_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Room not found with number {}", room_number)))?;

    if room.special_purpose {
        return Err(ApiError::Conflict(format!(
            "Room {} is a special purpose room and cannot be resized",
            room_number
        )));
    }
    if req.capacity == 0 || req.capacity > state.layout.default_capacity {
        return Err(ApiError::Validation(format!(
            "Capacity must be between 1 and {}",
            state.layout.default_capacity
        )));
    }
    if req.capacity < room.occupancy_count {
        return Err(ApiError::Conflict(format!(
            "Room {} has {} occupants; capacity cannot drop below that",
            room_number, room.occupancy_count
        )));
    }

    let updated = repo.update(room_number, req.capacity).await?;
    Ok(Json(updated))
}

async fn delete_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(room_number): Path<u32>,
) -> Result<StatusCode, ApiError> {
    auth.require(&[])?;

    let repo = RoomRepository::new(state.pool.clone());
    if repo.get(room_number).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Room not found with number {}",
            room_number
        )));
    }
    repo.delete(room_number).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn room_students(
    State(state): State<AppState>,
    Path(room_number): Path<u32>,
) -> Result<Json<Vec<OccupantView>>, ApiError> {
    let repo = RoomRepository::new(state.pool.clone());
    if repo.get(room_number).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Room not found with number {}",
            room_number
        )));
    }
    Ok(Json(occupants_of(&state, room_number).await?))
}

async fn assign_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((room_number, student_code)): Path<(u32, String)>,
) -> Result<Json<RoomView>, ApiError> {
    auth.require(&[Role::Warden])?;

    let service = AssignmentService::new(state.pool.clone());
    service.assign(&student_code, room_number).await?;

    get_room(State(state), Path(room_number)).await
}

async fn remove_student(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((room_number, student_code)): Path<(u32, String)>,
) -> Result<Json<RoomView>, ApiError> {
    auth.require(&[Role::Warden])?;

    let service = AssignmentService::new(state.pool.clone());
    service.remove(&student_code, room_number).await?;

    get_room(State(state), Path(room_number)).await
}

#[derive(Serialize)]
struct UnassignAllResponse {
    students_unassigned: u64,
}

async fn unassign_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UnassignAllResponse>, ApiError> {
    auth.require(&[])?;

    let cleared = AssignmentService::new(state.pool.clone())
        .remove_all()
        .await?;
    Ok(Json(UnassignAllResponse {
        students_unassigned: cleared,
    }))
}

async fn reconcile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ReconcileReport>, ApiError> {
    auth.require(&[Role::Warden])?;

    let report = AssignmentService::new(state.pool.clone())
        .reconcile()
        .await?;
    Ok(Json(report))
}

async fn caller_room(state: &AppState, auth: &AuthUser) -> Result<Option<u32>, ApiError> {
    let users = UserRepository::new(state.pool.clone());
    let id = auth
        .user_id
        .parse()
        .map_err(|_| ApiError::Validation("Token carries no valid user id".to_string()))?;
    let user = users
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User record not found for token".to_string()))?;
    Ok(user.room_number)
}

async fn my_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<RoomView>, ApiError> {
    auth.require(&[Role::Student])?;

    match caller_room(&state, &auth).await? {
        Some(number) => get_room(State(state), Path(number)).await,
        None => Err(ApiError::NotFound(
            "You are not assigned to any room".to_string(),
        )),
    }
}

async fn my_roommates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<OccupantView>>, ApiError> {
    auth.require(&[Role::Student])?;

    let number = caller_room(&state, &auth).await?.ok_or_else(|| {
        ApiError::NotFound("You are not assigned to any room".to_string())
    })?;

    let mut occupants = occupants_of(&state, number).await?;
    occupants.retain(|o| o.id != auth.user_id);
    Ok(Json(occupants))
}
