use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::room_repo::parse_timestamp;
use crate::models::{Role, User};

/// Query filters for user listing.
#[derive(Debug, Default, Clone)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub year: Option<i32>,
    pub branch: Option<String>,
    pub college: Option<String>,
    pub email: Option<String>,
    pub student_code: Option<String>,
    pub room_number: Option<u32>,
    /// Only students with no room assigned.
    pub unassigned: bool,
}

pub struct UserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    student_code: Option<String>,
    phone: Option<String>,
    year: Option<i64>,
    branch: Option<String>,
    college: Option<String>,
    room_number: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &User) -> Result<User, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role, student_code, phone, year, branch, college, room_number, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.student_code)
        .bind(&user.phone)
        .bind(user.year)
        .bind(&user.branch)
        .bind(&user.college)
        .bind(user.room_number.map(|n| n as i64))
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(user.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(hydrate_user))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(hydrate_user))
    }

    /// Look up a student by their student code. Staff accounts are excluded.
    pub async fn get_student(&self, student_code: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT * FROM users WHERE student_code = ? AND role = 'student'")
                .bind(student_code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(hydrate_user))
    }

    pub async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM users WHERE 1=1");
        if filter.role.is_some() {
            sql.push_str(" AND role = ?");
        }
        if filter.year.is_some() {
            sql.push_str(" AND year = ?");
        }
        if filter.branch.is_some() {
            sql.push_str(" AND branch = ?");
        }
        if filter.college.is_some() {
            sql.push_str(" AND college = ?");
        }
        if filter.email.is_some() {
            sql.push_str(" AND LOWER(email) = LOWER(?)");
        }
        if filter.student_code.is_some() {
            sql.push_str(" AND student_code = ?");
        }
        if filter.unassigned {
            sql.push_str(" AND role = 'student' AND room_number IS NULL");
        } else if filter.room_number.is_some() {
            sql.push_str(" AND room_number = ?");
        }
        sql.push_str(" ORDER BY name");

        let mut query = sqlx::query_as::<_, UserRow>(&sql);
        if let Some(role) = filter.role {
            query = query.bind(role.as_str());
        }
        if let Some(year) = filter.year {
            query = query.bind(year);
        }
        if let Some(branch) = &filter.branch {
            query = query.bind(branch);
        }
        if let Some(college) = &filter.college {
            query = query.bind(college);
        }
        if let Some(email) = &filter.email {
            query = query.bind(email);
        }
        if let Some(code) = &filter.student_code {
            query = query.bind(code);
        }
        if !filter.unassigned {
            if let Some(room) = filter.room_number {
                query = query.bind(room as i64);
            }
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(hydrate_user).collect())
    }

    /// Update the descriptive fields. The room pointer is owned by the
    /// assignment synchronizer and is not written here.
    pub async fn update(&self, user: &User) -> Result<User, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET name = ?, email = ?, role = ?, student_code = ?, phone = ?,
                year = ?, branch = ?, college = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.student_code)
        .bind(&user.phone)
        .bind(user.year)
        .bind(&user.branch)
        .bind(&user.college)
        .bind(Utc::now().to_rfc3339())
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await?;

        self.get(user.id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Delete a user. If they occupy a room, the roster entry and count are
    /// removed in the same transaction.
    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id_str = id.to_string();

        let room_number: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT room_number FROM users WHERE id = ?")
                .bind(&id_str)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((Some(room_number),)) = room_number {
            let roster: Option<(String,)> =
                sqlx::query_as("SELECT occupant_ids FROM rooms WHERE room_number = ?")
                    .bind(room_number)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some((roster,)) = roster {
                let mut ids: Vec<String> = serde_json::from_str(&roster).unwrap_or_default();
                ids.retain(|occupant| occupant != &id_str);
                let occupants = serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string());
                sqlx::query(
                    "UPDATE rooms SET occupant_ids = ?, occupancy_count = ?, updated_at = ? WHERE room_number = ?",
                )
                .bind(&occupants)
                .bind(ids.len() as i64)
                .bind(Utc::now().to_rfc3339())
                .bind(room_number)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn hydrate_user(row: UserRow) -> User {
    User {
        id: Uuid::parse_str(&row.id).unwrap_or_default(),
        name: row.name,
        email: row.email,
        role: Role::parse(&row.role).unwrap_or(Role::Student),
        student_code: row.student_code,
        phone: row.phone,
        year: row.year.map(|y| y as i32),
        branch: row.branch,
        college: row.college,
        room_number: row.room_number.map(|n| n as u32),
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
        repo: UserRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            repo: UserRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let student = User::student("Asha Rao", "asha@example.com", "ST001")
            .with_phone("9876543210")
            .with_academics(2, "CSE", "NIT Warangal");

        let created = repo.create(&student).await.unwrap();
        assert_eq!(created.name, "Asha Rao");
        assert_eq!(created.role, Role::Student);

        let fetched = repo.get(student.id).await.unwrap().unwrap();
        assert_eq!(fetched.student_code.as_deref(), Some("ST001"));
        assert_eq!(fetched.year, Some(2));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&User::new("A", "dup@example.com", Role::Warden))
            .await
            .unwrap();
        let result = repo
            .create(&User::new("B", "dup@example.com", Role::Warden))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_by_email_case_insensitive() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&User::new("A", "Mixed@Example.com", Role::Admin))
            .await
            .unwrap();
        assert!(repo
            .get_by_email("mixed@example.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_get_student_by_code() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&User::student("S", "s@example.com", "ST010"))
            .await
            .unwrap();

        let found = repo.get_student("ST010").await.unwrap();
        assert!(found.is_some());
        assert!(repo.get_student("ST999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(
            &User::student("A", "a@example.com", "ST001").with_academics(1, "CSE", "NITW"),
        )
        .await
        .unwrap();
        repo.create(
            &User::student("B", "b@example.com", "ST002").with_academics(2, "ECE", "NITW"),
        )
        .await
        .unwrap();
        repo.create(&User::new("W", "w@example.com", Role::Warden))
            .await
            .unwrap();

        let students = repo
            .list(&UserFilter {
                role: Some(Role::Student),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(students.len(), 2);

        let second_years = repo
            .list(&UserFilter {
                year: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second_years.len(), 1);
        assert_eq!(second_years[0].name, "B");

        let unassigned = repo
            .list(&UserFilter {
                unassigned: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unassigned.len(), 2);
    }

    #[tokio::test]
    async fn test_update_descriptive_fields() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let student = User::student("Before", "before@example.com", "ST003");
        repo.create(&student).await.unwrap();

        let mut changed = student.clone();
        changed.name = "After".to_string();
        changed.phone = Some("9999999999".to_string());

        let updated = repo.update(&changed).await.unwrap();
        assert_eq!(updated.name, "After");
        assert_eq!(updated.phone.as_deref(), Some("9999999999"));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let user = User::new("Gone", "gone@example.com", Role::Admin);
        repo.create(&user).await.unwrap();
        repo.delete(user.id).await.unwrap();
        assert!(repo.get(user.id).await.unwrap().is_none());
    }
}
