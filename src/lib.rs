//! Hostel administration service.
//!
//! SQLite-backed registry of rooms, students, books, placements and
//! feedback, served over a JSON REST API. The assignment module keeps the
//! room rosters and the students' room pointers consistent.

pub mod assignment;
pub mod config;
pub mod db;
pub mod models;
pub mod server;
