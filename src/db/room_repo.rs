use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::RoomLayout;
use crate::models::Room;

/// Query filters for room listing.
#[derive(Debug, Default, Clone)]
pub struct RoomFilter {
    pub special_purpose: Option<bool>,
    pub purpose: Option<String>,
    pub available: Option<bool>,
}

pub struct RoomRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    room_number: i64,
    capacity: i64,
    special_purpose: bool,
    purpose: String,
    occupant_ids: String,
    occupancy_count: i64,
    created_at: String,
    updated_at: String,
}

impl RoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, room: &Room) -> Result<Room, sqlx::Error> {
        let occupants =
            serde_json::to_string(&room.occupant_ids).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO rooms (room_number, capacity, special_purpose, purpose, occupant_ids, occupancy_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(room.room_number as i64)
        .bind(room.capacity as i64)
        .bind(room.special_purpose)
        .bind(&room.purpose)
        .bind(&occupants)
        .bind(room.occupancy_count as i64)
        .bind(room.created_at.to_rfc3339())
        .bind(room.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(room.room_number)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&self, room_number: u32) -> Result<Option<Room>, sqlx::Error> {
        let row: Option<RoomRow> = sqlx::query_as("SELECT * FROM rooms WHERE room_number = ?")
            .bind(room_number as i64)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(hydrate_room))
    }

    pub async fn list(&self, filter: &RoomFilter) -> Result<Vec<Room>, sqlx::Error> {
        let mut sql = String::from("SELECT * FROM rooms WHERE 1=1");
        if filter.special_purpose.is_some() {
            sql.push_str(" AND special_purpose = ?");
        }
        if filter.purpose.is_some() {
            sql.push_str(" AND purpose = ?");
        }
        sql.push_str(" ORDER BY room_number");

        let mut query = sqlx::query_as::<_, RoomRow>(&sql);
        if let Some(special) = filter.special_purpose {
            query = query.bind(special);
        }
        if let Some(purpose) = &filter.purpose {
            query = query.bind(purpose);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut rooms: Vec<Room> = rows.into_iter().map(hydrate_room).collect();

        // Availability depends on the derived count, filter in memory
        if let Some(wanted) = filter.available {
            rooms.retain(|room| room.is_available() == wanted);
        }

        Ok(rooms)
    }

    /// Update the mutable room fields. Room number and special-purpose status
    /// are fixed for the life of the room.
    pub async fn update(&self, room_number: u32, capacity: u32) -> Result<Room, sqlx::Error> {
        sqlx::query("UPDATE rooms SET capacity = ?, updated_at = ? WHERE room_number = ?")
            .bind(capacity as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(room_number as i64)
            .execute(&self.pool)
            .await?;

        self.get(room_number).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Delete a room, clearing the room pointer of every occupant in the same
    /// transaction.
    pub async fn delete(&self, room_number: u32) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET room_number = NULL, updated_at = ? WHERE room_number = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(room_number as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM rooms WHERE room_number = ?")
            .bind(room_number as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Create every room from the layout that doesn't exist yet. Returns how
    /// many rooms were created.
    pub async fn seed(&self, layout: &RoomLayout) -> Result<usize, sqlx::Error> {
        let mut created = 0;
        for number in layout.first_room..=layout.last_room {
            if self.get(number).await?.is_some() {
                continue;
            }
            let room = match layout.special_purpose(number) {
                Some(purpose) => Room::special(number, purpose),
                None => Room::regular(number, layout.default_capacity),
            };
            self.create(&room).await?;
            created += 1;
        }
        if created > 0 {
            tracing::info!("Seeded {} room(s)", created);
        }
        Ok(created)
    }
}

fn hydrate_room(row: RoomRow) -> Room {
    let occupant_ids: Vec<String> = serde_json::from_str(&row.occupant_ids).unwrap_or_default();
    Room {
        room_number: row.room_number as u32,
        capacity: row.capacity as u32,
        special_purpose: row.special_purpose,
        purpose: row.purpose,
        occupant_ids,
        occupancy_count: row.occupancy_count.max(0) as u32,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        repo: RoomRepository,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(Some(db_path)).await.unwrap();
        TestContext {
            repo: RoomRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_room() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let room = Room::regular(10, 6);
        let created = repo.create(&room).await.unwrap();
        assert_eq!(created.room_number, 10);
        assert_eq!(created.capacity, 6);
        assert!(created.occupant_ids.is_empty());

        let fetched = repo.get(10).await.unwrap().unwrap();
        assert_eq!(fetched.room_number, 10);
        assert!(!fetched.special_purpose);
    }

    #[tokio::test]
    async fn test_duplicate_room_number_rejected() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Room::regular(5, 6)).await.unwrap();
        let result = repo.create(&Room::regular(5, 4)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_seed_full_layout() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let layout = RoomLayout::default();
        let created = repo.seed(&layout).await.unwrap();
        assert_eq!(created, 31);
        assert_eq!(repo.count().await.unwrap(), 31);

        let library = repo.get(15).await.unwrap().unwrap();
        assert!(library.special_purpose);
        assert_eq!(library.purpose, "Book Library");
        assert_eq!(library.capacity, 0);

        let dorm = repo.get(10).await.unwrap().unwrap();
        assert!(!dorm.special_purpose);
        assert_eq!(dorm.capacity, 6);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        let layout = RoomLayout::default();
        repo.seed(&layout).await.unwrap();
        let created_again = repo.seed(&layout).await.unwrap();
        assert_eq!(created_again, 0);
        assert_eq!(repo.count().await.unwrap(), 31);
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;
        repo.seed(&RoomLayout::default()).await.unwrap();

        let all = repo.list(&RoomFilter::default()).await.unwrap();
        assert_eq!(all.len(), 31);
        // Sorted by room number
        assert_eq!(all[0].room_number, 1);
        assert_eq!(all[30].room_number, 31);

        let special = repo
            .list(&RoomFilter {
                special_purpose: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(special.len(), 6);

        let library = repo
            .list(&RoomFilter {
                purpose: Some("Book Library".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].room_number, 15);

        // Every regular room is empty, so all 25 are available; special rooms never are
        let available = repo
            .list(&RoomFilter {
                available: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(available.len(), 25);
    }

    #[tokio::test]
    async fn test_update_capacity() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Room::regular(3, 6)).await.unwrap();
        let updated = repo.update(3, 4).await.unwrap();
        assert_eq!(updated.capacity, 4);
    }

    #[tokio::test]
    async fn test_delete_room() {
        let ctx = setup_repo().await;
        let repo = &ctx.repo;

        repo.create(&Room::regular(7, 6)).await.unwrap();
        repo.delete(7).await.unwrap();
        assert!(repo.get(7).await.unwrap().is_none());
    }
}
