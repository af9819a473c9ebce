//! HTTP API server.
//!
//! Public routes are limited to the health check; everything else sits
//! behind the token middleware.

pub mod auth;
pub mod books;
pub mod error;
pub mod feedback;
pub mod placements;
pub mod rooms;
pub mod users;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use auth::{AuthUser, TokenStore};
pub use error::ApiError;

use crate::config::RoomLayout;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub tokens: Arc<TokenStore>,
    pub layout: Arc<RoomLayout>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required).
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .merge(rooms::routes())
        .merge(users::routes())
        .merge(books::routes())
        .merge(placements::routes())
        .merge(feedback::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, UserRepository};
    use crate::models::{Role, User};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestContext {
        router: Router,
        admin_token: String,
        _temp_dir: TempDir,
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();

        let layout = RoomLayout::default();
        crate::db::RoomRepository::new(pool.clone())
            .seed(&layout)
            .await
            .unwrap();

        let admin = User::new("Admin", "admin@example.com", Role::Admin);
        UserRepository::new(pool.clone())
            .create(&admin)
            .await
            .unwrap();

        let admin_token = "test-admin-token".to_string();
        let tokens = TokenStore::with_token(&admin_token, &admin.id.to_string(), Role::Admin);

        let state = AppState {
            pool,
            tokens: Arc::new(tokens),
            layout: Arc::new(layout),
        };
        TestContext {
            router: app(state),
            admin_token,
            _temp_dir: temp_dir,
        }
    }

    fn authed(ctx: &TestContext, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", ctx.admin_token),
            )
            .header(header::CONTENT_TYPE, "application/json");
        match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let ctx = setup().await;
        let response = ctx
            .router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_rejects_missing_token() {
        let ctx = setup().await;
        let response = ctx
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/rooms")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_cookie_is_accepted() {
        let ctx = setup().await;
        let response = ctx
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/rooms")
                    .header(
                        header::COOKIE,
                        format!("theme=dark; session_token={}", ctx.admin_token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_seeded_layout_is_served() {
        let ctx = setup().await;
        let response = ctx
            .router
            .clone()
            .oneshot(authed(&ctx, "GET", "/api/rooms", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rooms = body_json(response).await;
        assert_eq!(rooms.as_array().unwrap().len(), 31);

        // Room 15 is the library in the default layout
        let response = ctx
            .router
            .clone()
            .oneshot(authed(&ctx, "GET", "/api/rooms/15", None))
            .await
            .unwrap();
        let room = body_json(response).await;
        assert_eq!(room["special_purpose"], json!(true));
        assert_eq!(room["purpose"], json!("Book Library"));
    }

    #[tokio::test]
    async fn test_assign_student_over_http() {
        let ctx = setup().await;

        let response = ctx
            .router
            .clone()
            .oneshot(authed(
                &ctx,
                "POST",
                "/api/users",
                Some(json!({
                    "name": "Asha",
                    "email": "asha@example.com",
                    "student_code": "ST001"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = ctx
            .router
            .clone()
            .oneshot(authed(&ctx, "POST", "/api/rooms/2/assign/ST001", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let room = body_json(response).await;
        assert_eq!(room["occupancy_count"], json!(1));
        assert_eq!(room["students"][0]["student_code"], json!("ST001"));
    }

    #[tokio::test]
    async fn test_assign_to_special_room_is_conflict() {
        let ctx = setup().await;

        ctx.router
            .clone()
            .oneshot(authed(
                &ctx,
                "POST",
                "/api/users",
                Some(json!({
                    "name": "Asha",
                    "email": "asha@example.com",
                    "student_code": "ST001"
                })),
            ))
            .await
            .unwrap();

        let response = ctx
            .router
            .clone()
            .oneshot(authed(&ctx, "POST", "/api/rooms/16/assign/ST001", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["error"], json!("conflict"));
    }

    #[tokio::test]
    async fn test_unknown_student_is_not_found() {
        let ctx = setup().await;
        let response = ctx
            .router
            .clone()
            .oneshot(authed(&ctx, "POST", "/api/rooms/2/assign/GHOST", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
