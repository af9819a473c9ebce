use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::room_repo::parse_timestamp;
use crate::models::Placement;

/// Aggregates for the placement dashboard.
#[derive(Debug, Serialize)]
pub struct PlacementStats {
    pub total: i64,
    pub average_package: f64,
    pub highest_package: f64,
    pub by_year: BTreeMap<i32, i64>,
    pub by_company: BTreeMap<String, i64>,
}

pub struct PlacementRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PlacementRow {
    id: String,
    student_name: String,
    branch: String,
    year: i64,
    company: String,
    job_role: String,
    package_offered: f64,
    created_at: String,
    updated_at: String,
}

impl PlacementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, placement: &Placement) -> Result<Placement, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO placements (id, student_name, branch, year, company, job_role, package_offered, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(placement.id.to_string())
        .bind(&placement.student_name)
        .bind(&placement.branch)
        .bind(placement.year)
        .bind(&placement.company)
        .bind(&placement.job_role)
        .bind(placement.package_offered)
        .bind(placement.created_at.to_rfc3339())
        .bind(placement.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(placement.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Placement>, sqlx::Error> {
        let row: Option<PlacementRow> = sqlx::query_as("SELECT * FROM placements WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_placement))
    }

    pub async fn list(
        &self,
        year: Option<i32>,
        branch: Option<&str>,
        company: Option<&str>,
    ) -> Result<Vec<Placement>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM placements WHERE 1=1");
        if year.is_some() {
            sql.push_str(" AND year = ?");
        }
        if branch.is_some() {
            sql.push_str(" AND branch = ?");
        }
        if company.is_some() {
            sql.push_str(" AND LOWER(company) = LOWER(?)");
        }
        sql.push_str(" ORDER BY year DESC, student_name");

        let mut query = sqlx::query_as::<_, PlacementRow>(&sql);
        if let Some(year) = year {
            query = query.bind(year);
        }
        if let Some(branch) = branch {
            query = query.bind(branch);
        }
        if let Some(company) = company {
            query = query.bind(company);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(hydrate_placement).collect())
    }

    pub async fn list_by_student_name(&self, name: &str) -> Result<Vec<Placement>, sqlx::Error> {
        let rows: Vec<PlacementRow> = sqlx::query_as(
            "SELECT * FROM placements WHERE LOWER(student_name) = LOWER(?) ORDER BY year DESC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(hydrate_placement).collect())
    }

    pub async fn update(&self, placement: &Placement) -> Result<Placement, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE placements
            SET student_name = ?, branch = ?, year = ?, company = ?, job_role = ?,
                package_offered = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&placement.student_name)
        .bind(&placement.branch)
        .bind(placement.year)
        .bind(&placement.company)
        .bind(&placement.job_role)
        .bind(placement.package_offered)
        .bind(Utc::now().to_rfc3339())
        .bind(placement.id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(placement.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM placements WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<PlacementStats, sqlx::Error> {
        let (total, average_package, highest_package): (i64, Option<f64>, Option<f64>) =
            sqlx::query_as(
                "SELECT COUNT(*), AVG(package_offered), MAX(package_offered) FROM placements",
            )
            .fetch_one(&self.pool)
            .await?;

        let year_rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT year, COUNT(*) FROM placements GROUP BY year")
                .fetch_all(&self.pool)
                .await?;

        let company_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT company, COUNT(*) FROM placements GROUP BY company")
                .fetch_all(&self.pool)
                .await?;

        Ok(PlacementStats {
            total,
            average_package: average_package.unwrap_or(0.0),
            highest_package: highest_package.unwrap_or(0.0),
            by_year: year_rows.into_iter().map(|(y, c)| (y as i32, c)).collect(),
            by_company: company_rows.into_iter().collect(),
        })
    }
}

fn hydrate_placement(row: PlacementRow) -> Placement {
    Placement {
        id: Uuid::parse_str(&row.id).unwrap_or_default(),
        student_name: row.student_name,
        branch: row.branch,
        year: row.year as i32,
        company: row.company,
        job_role: row.job_role,
        package_offered: row.package_offered,
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
        repo: PlacementRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            repo: PlacementRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let p = Placement::new("Asha Rao", "CSE", 2025, "Acme Corp", "SDE", 12.5);
        let created = repo.create(&p).await.unwrap();
        assert_eq!(created.company, "Acme Corp");

        let mut changed = created.clone();
        changed.package_offered = 14.0;
        let updated = repo.update(&changed).await.unwrap();
        assert_eq!(updated.package_offered, 14.0);

        repo.delete(p.id).await.unwrap();
        assert!(repo.get(p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Placement::new("A", "CSE", 2024, "Acme", "SDE", 10.0))
            .await
            .unwrap();
        repo.create(&Placement::new("B", "ECE", 2025, "Acme", "SDE", 14.0))
            .await
            .unwrap();
        repo.create(&Placement::new("C", "CSE", 2025, "Globex", "Analyst", 9.0))
            .await
            .unwrap();

        let y2025 = repo.list(Some(2025), None, None).await.unwrap();
        assert_eq!(y2025.len(), 2);

        let acme = repo.list(None, None, Some("acme")).await.unwrap();
        assert_eq!(acme.len(), 2);

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.highest_package, 14.0);
        assert!((stats.average_package - 11.0).abs() < 1e-9);
        assert_eq!(stats.by_year.get(&2025), Some(&2));
        assert_eq!(stats.by_company.get("Acme"), Some(&2));
    }

    #[tokio::test]
    async fn test_list_by_student_name() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Placement::new("Asha Rao", "CSE", 2025, "Acme", "SDE", 12.0))
            .await
            .unwrap();

        let found = repo.list_by_student_name("asha rao").await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
