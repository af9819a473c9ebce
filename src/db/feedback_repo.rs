use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::room_repo::parse_timestamp;
use crate::models::{Feedback, FeedbackCategory, FeedbackPriority};

/// Aggregates for the feedback dashboard.
#[derive(Debug, Serialize)]
pub struct FeedbackStats {
    pub total: i64,
    pub pending: i64,
    pub responded: i64,
    pub resolved: i64,
    pub average_rating: f64,
    pub by_category: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
}

pub struct FeedbackRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: String,
    user_id: String,
    category: String,
    rating: i64,
    comment: String,
    anonymous: bool,
    response: Option<String>,
    responded_by: Option<String>,
    responded_at: Option<String>,
    resolved: bool,
    resolved_by: Option<String>,
    resolved_at: Option<String>,
    priority: String,
    created_at: String,
    updated_at: String,
}

impl FeedbackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, feedback: &Feedback) -> Result<Feedback, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO feedback (id, user_id, category, rating, comment, anonymous, response,
                responded_by, responded_at, resolved, resolved_by, resolved_at, priority, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, NULL, 0, NULL, NULL, ?, ?, ?)
            "#,
        )
        .bind(feedback.id.to_string())
        .bind(feedback.user_id.to_string())
        .bind(feedback.category.as_str())
        .bind(feedback.rating)
        .bind(&feedback.comment)
        .bind(feedback.anonymous)
        .bind(feedback.priority.as_str())
        .bind(feedback.created_at.to_rfc3339())
        .bind(feedback.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(feedback.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Feedback>, sqlx::Error> {
        let row: Option<FeedbackRow> = sqlx::query_as("SELECT * FROM feedback WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_feedback))
    }

    pub async fn list(
        &self,
        category: Option<FeedbackCategory>,
        resolved: Option<bool>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Feedback>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM feedback WHERE 1=1");
        if category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if resolved.is_some() {
            sql.push_str(" AND resolved = ?");
        }
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as::<_, FeedbackRow>(&sql);
        if let Some(category) = category {
            query = query.bind(category.as_str());
        }
        if let Some(resolved) = resolved {
            query = query.bind(resolved);
        }
        if let Some(user_id) = user_id {
            query = query.bind(user_id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(hydrate_feedback).collect())
    }

    pub async fn respond(
        &self,
        id: Uuid,
        response: &str,
        responder: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Feedback, sqlx::Error> {
        sqlx::query(
            "UPDATE feedback SET response = ?, responded_by = ?, responded_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(response)
        .bind(responder.to_string())
        .bind(at.to_rfc3339())
        .bind(at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn resolve(
        &self,
        id: Uuid,
        resolver: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Feedback, sqlx::Error> {
        sqlx::query(
            "UPDATE feedback SET resolved = 1, resolved_by = ?, resolved_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(resolver.to_string())
        .bind(at.to_rfc3339())
        .bind(at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM feedback WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<FeedbackStats, sqlx::Error> {
        let (total, resolved, responded, average_rating): (i64, i64, i64, Option<f64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*),
                       SUM(CASE WHEN resolved = 1 THEN 1 ELSE 0 END),
                       SUM(CASE WHEN response IS NOT NULL THEN 1 ELSE 0 END),
                       AVG(rating)
                FROM feedback
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        let by_category: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM feedback GROUP BY category")
                .fetch_all(&self.pool)
                .await?;

        let by_priority: Vec<(String, i64)> =
            sqlx::query_as("SELECT priority, COUNT(*) FROM feedback GROUP BY priority")
                .fetch_all(&self.pool)
                .await?;

        Ok(FeedbackStats {
            total,
            pending: total - responded,
            responded,
            resolved,
            average_rating: average_rating.unwrap_or(0.0),
            by_category: by_category.into_iter().collect(),
            by_priority: by_priority.into_iter().collect(),
        })
    }
}

fn hydrate_feedback(row: FeedbackRow) -> Feedback {
    Feedback {
        id: Uuid::parse_str(&row.id).unwrap_or_default(),
        user_id: Uuid::parse_str(&row.user_id).unwrap_or_default(),
        category: FeedbackCategory::parse(&row.category).unwrap_or(FeedbackCategory::Other),
        rating: row.rating as i32,
        comment: row.comment,
        anonymous: row.anonymous,
        response: row.response,
        responded_by: row.responded_by.and_then(|s| Uuid::parse_str(&s).ok()),
        responded_at: row.responded_at.as_deref().map(parse_timestamp),
        resolved: row.resolved,
        resolved_by: row.resolved_by.and_then(|s| Uuid::parse_str(&s).ok()),
        resolved_at: row.resolved_at.as_deref().map(parse_timestamp),
        priority: FeedbackPriority::parse(&row.priority).unwrap_or(FeedbackPriority::Medium),
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: FeedbackRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            repo: FeedbackRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let fb = Feedback::new(Uuid::new_v4(), FeedbackCategory::Food, 2, "Cold dinners")
            .with_priority(FeedbackPriority::High);
        let created = repo.create(&fb).await.unwrap();
        assert_eq!(created.rating, 2);
        assert_eq!(created.priority, FeedbackPriority::High);
        assert_eq!(created.status(), "pending");
    }

    #[tokio::test]
    async fn test_respond_and_resolve() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let fb = Feedback::new(Uuid::new_v4(), FeedbackCategory::Internet, 1, "Wifi down");
        repo.create(&fb).await.unwrap();

        let warden = Uuid::new_v4();
        let responded = repo
            .respond(fb.id, "Router replaced", warden, Utc::now())
            .await
            .unwrap();
        assert_eq!(responded.status(), "responded");
        assert_eq!(responded.responded_by, Some(warden));

        let resolved = repo.resolve(fb.id, warden, Utc::now()).await.unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let author = Uuid::new_v4();
        repo.create(&Feedback::new(author, FeedbackCategory::Food, 3, "Bland"))
            .await
            .unwrap();
        repo.create(&Feedback::new(
            Uuid::new_v4(),
            FeedbackCategory::Security,
            4,
            "Gate left open",
        ))
        .await
        .unwrap();

        let food = repo
            .list(Some(FeedbackCategory::Food), None, None)
            .await
            .unwrap();
        assert_eq!(food.len(), 1);

        let mine = repo.list(None, None, Some(author)).await.unwrap();
        assert_eq!(mine.len(), 1);

        let unresolved = repo.list(None, Some(false), None).await.unwrap();
        assert_eq!(unresolved.len(), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let a = Feedback::new(Uuid::new_v4(), FeedbackCategory::Food, 2, "x");
        let b = Feedback::new(Uuid::new_v4(), FeedbackCategory::Food, 4, "y");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();
        repo.respond(a.id, "ok", Uuid::new_v4(), Utc::now())
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.responded, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.resolved, 0);
        assert!((stats.average_rating - 3.0).abs() < 1e-9);
        assert_eq!(stats.by_category.get("food"), Some(&2));
    }
}
