//! Room/student assignment synchronizer.
//!
//! A student's room is recorded twice: as `users.room_number` and as an entry
//! in the room's `occupant_ids` roster (with a derived `occupancy_count`).
//! Every mutation here updates both sides inside one database transaction, so
//! the two records cannot drift through the API. Drift can still be introduced
//! by direct data edits; [`AssignmentService::reconcile`] and
//! [`AssignmentService::rebuild`] are the repair paths for that case.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("Room not found with number {0}")]
    RoomNotFound(u32),

    #[error("Student not found with ID {0}")]
    StudentNotFound(String),

    #[error("Room {room} is a special purpose room ({purpose}) and cannot be assigned to students")]
    SpecialPurposeRoom { room: u32, purpose: String },

    #[error("Room {0} is at full capacity")]
    RoomFull(u32),

    #[error("Student {student} is not assigned to Room {room}")]
    Mismatch { student: String, room: u32 },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Outcome of a [`AssignmentService::reconcile`] pass.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub rooms_checked: usize,
    pub rooms_repaired: usize,
    pub stale_entries_removed: usize,
}

/// Outcome of a [`AssignmentService::rebuild`].
#[derive(Debug, Default, Serialize)]
pub struct RebuildReport {
    pub rooms_rebuilt: usize,
    pub students_placed: usize,
}

/// Both-direction drift report from [`AssignmentService::diagnose`].
#[derive(Debug, Default, Serialize)]
pub struct DriftReport {
    /// Roster ids that don't parse or reference no existing student.
    pub stale_roster_entries: usize,
    /// Roster members whose own room pointer disagrees with the room.
    pub mismatched_pointers: usize,
    /// Rooms whose occupancy_count differs from the roster length.
    pub count_mismatches: usize,
    /// Students with a room pointer the room's roster doesn't know about.
    pub orphaned_students: usize,
    pub details: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.stale_roster_entries == 0
            && self.mismatched_pointers == 0
            && self.count_mismatches == 0
            && self.orphaned_students == 0
    }
}

#[derive(sqlx::FromRow)]
struct RoomSlot {
    room_number: i64,
    capacity: i64,
    special_purpose: bool,
    purpose: String,
    occupant_ids: String,
    occupancy_count: i64,
}

#[derive(sqlx::FromRow)]
struct StudentSlot {
    id: String,
    name: String,
    room_number: Option<i64>,
}

pub struct AssignmentService {
    pool: SqlitePool,
}

impl AssignmentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Assign a student (by student code) to a room. If the student already
    /// lives somewhere else they are pulled out of the old roster first; the
    /// whole move is one transaction.
    pub async fn assign(
        &self,
        student_code: &str,
        room_number: u32,
    ) -> Result<(), AssignmentError> {
        let mut tx = self.pool.begin().await?;
        let student = fetch_student_by_code(&mut tx, student_code).await?;
        self.assign_in_tx(&mut tx, &student, room_number).await?;
        tx.commit().await?;

        tracing::info!(student = %student.name, room = room_number, "student assigned");
        Ok(())
    }

    /// Assign by internal user id. Used by the user create/update handlers
    /// where the record is already at hand.
    pub async fn assign_user(
        &self,
        user_id: Uuid,
        room_number: u32,
    ) -> Result<(), AssignmentError> {
        let mut tx = self.pool.begin().await?;
        let student = fetch_student_by_id(&mut tx, user_id).await?;
        self.assign_in_tx(&mut tx, &student, room_number).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn assign_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        student: &StudentSlot,
        room_number: u32,
    ) -> Result<(), AssignmentError> {
        let room = fetch_room(tx, room_number).await?;

        if room.special_purpose {
            return Err(AssignmentError::SpecialPurposeRoom {
                room: room_number,
                purpose: room.purpose,
            });
        }
        if room.occupancy_count >= room.capacity {
            return Err(AssignmentError::RoomFull(room_number));
        }

        // Pull out of the old room first
        if let Some(old) = student.room_number {
            let old = old as u32;
            if old != room_number {
                if let Ok(old_room) = fetch_room(tx, old).await {
                    let mut roster = parse_roster(&old_room.occupant_ids);
                    roster.retain(|id| id != &student.id);
                    write_roster(tx, old, &roster).await?;
                }
            }
        }

        let mut roster = parse_roster(&room.occupant_ids);
        roster.retain(|id| id != &student.id);
        roster.push(student.id.clone());
        write_roster(tx, room_number, &roster).await?;

        sqlx::query("UPDATE users SET room_number = ?, updated_at = ? WHERE id = ?")
            .bind(room_number as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(&student.id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Remove a student from the room they are recorded in. Fails with
    /// `Mismatch` if the student's pointer names a different room.
    pub async fn remove(
        &self,
        student_code: &str,
        room_number: u32,
    ) -> Result<(), AssignmentError> {
        let mut tx = self.pool.begin().await?;

        let room = fetch_room(&mut tx, room_number).await?;
        let student = fetch_student_by_code(&mut tx, student_code).await?;

        if student.room_number != Some(room_number as i64) {
            return Err(AssignmentError::Mismatch {
                student: student.name,
                room: room_number,
            });
        }

        sqlx::query("UPDATE users SET room_number = NULL, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&student.id)
            .execute(&mut *tx)
            .await?;

        let mut roster = parse_roster(&room.occupant_ids);
        roster.retain(|id| id != &student.id);
        write_roster(&mut tx, room_number, &roster).await?;

        tx.commit().await?;

        tracing::info!(student = %student.name, room = room_number, "student removed from room");
        Ok(())
    }

    /// Vacate every room: clears all student pointers and empties every
    /// roster in one transaction. Returns how many students were unassigned.
    pub async fn remove_all(&self) -> Result<u64, AssignmentError> {
        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query(
            "UPDATE users SET room_number = NULL, updated_at = ? WHERE role = 'student' AND room_number IS NOT NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "UPDATE rooms SET occupant_ids = '[]', occupancy_count = 0, updated_at = ? WHERE occupancy_count > 0 OR occupant_ids != '[]'",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(students = cleared, "all rooms vacated");
        Ok(cleared)
    }

    /// Repair pass over the rosters: drop entries that don't parse as ids or
    /// reference no existing student, and re-derive each count from its
    /// roster. Idempotent; checks only the room side.
    pub async fn reconcile(&self) -> Result<ReconcileReport, AssignmentError> {
        let mut tx = self.pool.begin().await?;
        let rooms = fetch_all_rooms(&mut tx).await?;

        let mut report = ReconcileReport::default();

        for room in rooms {
            report.rooms_checked += 1;
            let roster = parse_roster(&room.occupant_ids);

            let mut valid = Vec::with_capacity(roster.len());
            for entry in &roster {
                if Uuid::parse_str(entry).is_ok() && student_exists(&mut tx, entry).await? {
                    valid.push(entry.clone());
                } else {
                    tracing::warn!(
                        room = room.room_number,
                        entry = %entry,
                        "dropping stale roster entry"
                    );
                }
            }

            let removed = roster.len() - valid.len();
            if removed > 0 || room.occupancy_count != valid.len() as i64 {
                write_roster(&mut tx, room.room_number as u32, &valid).await?;
                report.rooms_repaired += 1;
                report.stale_entries_removed += removed;
            }
        }

        tx.commit().await?;

        if report.rooms_repaired > 0 {
            tracing::info!(
                repaired = report.rooms_repaired,
                removed = report.stale_entries_removed,
                "roster reconcile repaired drift"
            );
        }
        Ok(report)
    }

    /// Compare both directions of the relationship and report every
    /// inconsistency without changing anything.
    pub async fn diagnose(&self) -> Result<DriftReport, AssignmentError> {
        let mut tx = self.pool.begin().await?;
        let rooms = fetch_all_rooms(&mut tx).await?;

        let mut report = DriftReport::default();

        for room in &rooms {
            let roster = parse_roster(&room.occupant_ids);

            if room.occupancy_count != roster.len() as i64 {
                report.count_mismatches += 1;
                report.details.push(format!(
                    "room {}: occupancy_count {} != roster length {}",
                    room.room_number,
                    room.occupancy_count,
                    roster.len()
                ));
            }

            for entry in &roster {
                match fetch_student_row(&mut tx, entry).await? {
                    None => {
                        report.stale_roster_entries += 1;
                        report.details.push(format!(
                            "room {}: roster entry {} references no student",
                            room.room_number, entry
                        ));
                    }
                    Some(student) if student.room_number != Some(room.room_number) => {
                        report.mismatched_pointers += 1;
                        report.details.push(format!(
                            "room {}: {} has room pointer {:?}",
                            room.room_number, student.name, student.room_number
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        // Reverse direction: every pointed-at room must list the student
        let students = fetch_assigned_students(&mut tx).await?;
        for student in &students {
            let room_number = student.room_number.unwrap_or_default();
            let listed = rooms
                .iter()
                .find(|r| r.room_number == room_number)
                .map(|r| parse_roster(&r.occupant_ids).contains(&student.id))
                .unwrap_or(false);
            if !listed {
                report.orphaned_students += 1;
                report.details.push(format!(
                    "{} points at room {} but its roster doesn't list them",
                    student.name, room_number
                ));
            }
        }

        Ok(report)
    }

    /// Rebuild every roster from the students' own room pointers, treating
    /// the student record as ground truth and the rosters as derived state.
    pub async fn rebuild(&self) -> Result<RebuildReport, AssignmentError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE rooms SET occupant_ids = '[]', occupancy_count = 0, updated_at = ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let students = fetch_assigned_students(&mut tx).await?;

        let mut by_room: std::collections::BTreeMap<i64, Vec<String>> = Default::default();
        for student in students {
            if let Some(room) = student.room_number {
                by_room.entry(room).or_default().push(student.id);
            }
        }

        let mut report = RebuildReport::default();
        for (room_number, ids) in by_room {
            if fetch_room(&mut tx, room_number as u32).await.is_err() {
                tracing::warn!(room = room_number, "students point at a missing room");
                continue;
            }
            report.students_placed += ids.len();
            report.rooms_rebuilt += 1;
            write_roster(&mut tx, room_number as u32, &ids).await?;
        }

        tx.commit().await?;

        tracing::info!(
            rooms = report.rooms_rebuilt,
            students = report.students_placed,
            "rosters rebuilt from student records"
        );
        Ok(report)
    }
}

fn parse_roster(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

async fn write_roster(
    tx: &mut Transaction<'_, Sqlite>,
    room_number: u32,
    roster: &[String],
) -> Result<(), sqlx::Error> {
    let occupants = serde_json::to_string(roster).unwrap_or_else(|_| "[]".to_string());
    sqlx::query(
        "UPDATE rooms SET occupant_ids = ?, occupancy_count = ?, updated_at = ? WHERE room_number = ?",
    )
    .bind(&occupants)
    .bind(roster.len() as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(room_number as i64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch_room(
    tx: &mut Transaction<'_, Sqlite>,
    room_number: u32,
) -> Result<RoomSlot, AssignmentError> {
    let room: Option<RoomSlot> = sqlx::query_as(
        "SELECT room_number, capacity, special_purpose, purpose, occupant_ids, occupancy_count FROM rooms WHERE room_number = ?",
    )
    .bind(room_number as i64)
    .fetch_optional(&mut **tx)
    .await?;
    room.ok_or(AssignmentError::RoomNotFound(room_number))
}

async fn fetch_all_rooms(
    tx: &mut Transaction<'_, Sqlite>,
) -> Result<Vec<RoomSlot>, sqlx::Error> {
    sqlx::query_as(
        "SELECT room_number, capacity, special_purpose, purpose, occupant_ids, occupancy_count FROM rooms ORDER BY room_number",
    )
    .fetch_all(&mut **tx)
    .await
}

async fn fetch_student_by_code(
    tx: &mut Transaction<'_, Sqlite>,
    student_code: &str,
) -> Result<StudentSlot, AssignmentError> {
    let student: Option<StudentSlot> = sqlx::query_as(
        "SELECT id, name, room_number FROM users WHERE student_code = ? AND role = 'student'",
    )
    .bind(student_code)
    .fetch_optional(&mut **tx)
    .await?;
    student.ok_or_else(|| AssignmentError::StudentNotFound(student_code.to_string()))
}

async fn fetch_student_by_id(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: Uuid,
) -> Result<StudentSlot, AssignmentError> {
    let student: Option<StudentSlot> = sqlx::query_as(
        "SELECT id, name, room_number FROM users WHERE id = ? AND role = 'student'",
    )
    .bind(user_id.to_string())
    .fetch_optional(&mut **tx)
    .await?;
    student.ok_or_else(|| AssignmentError::StudentNotFound(user_id.to_string()))
}

async fn fetch_student_row(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
) -> Result<Option<StudentSlot>, sqlx::Error> {
    sqlx::query_as("SELECT id, name, room_number FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
}

async fn student_exists(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

async fn fetch_assigned_students(
    tx: &mut Transaction<'_, Sqlite>,
) -> Result<Vec<StudentSlot>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, name, room_number FROM users WHERE role = 'student' AND room_number IS NOT NULL ORDER BY name",
    )
    .fetch_all(&mut **tx)
    .await
}
