use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::password;
use crate::schedule::{PeriodSlot, Weekday};

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub teacher: String,
    pub day_of_week: Weekday,
    pub period_slot: PeriodSlot,
    pub location: String,
    pub week: u8,
}

/// Insert payload for one timetable slot. The row id and timestamp are
/// assigned here, not by the caller.
#[derive(Debug, Clone, Copy)]
pub struct NewCourse<'a> {
    pub owner_id: &'a str,
    pub name: &'a str,
    pub teacher: &'a str,
    pub day_of_week: Weekday,
    pub period_slot: PeriodSlot,
    pub location: &'a str,
    pub week: u8,
}

#[derive(Debug)]
pub enum StoreError {
    /// The UNIQUE(user_id, day_of_week, period_slot, week) index rejected
    /// the row: that slot is already occupied.
    SlotTaken,
    Db(rusqlite::Error),
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Created(User),
    UsernameTaken,
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        display_name: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn find_user_by_username(
    conn: &Connection,
    username: &str,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_hash, display_name, created_at
         FROM users WHERE username = ?",
        [username],
        user_from_row,
    )
    .optional()
}

/// Create a user. Uniqueness is enforced by the UNIQUE(username) constraint
/// on the insert itself, not by a preceding read, so two racing callers
/// cannot both get `Created`.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    display_name: &str,
) -> rusqlite::Result<RegisterOutcome> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        display_name: display_name.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };
    let inserted = conn.execute(
        "INSERT INTO users(id, username, password_hash, display_name, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &user.id,
            &user.username,
            &user.password_hash,
            &user.display_name,
            &user.created_at,
        ),
    );
    match inserted {
        Ok(_) => Ok(RegisterOutcome::Created(user)),
        Err(e) if is_unique_violation(&e) => Ok(RegisterOutcome::UsernameTaken),
        Err(e) => Err(e),
    }
}

/// Hash the supplied password and compare against the stored digest.
/// Plaintext never reaches the database layer.
pub fn verify_user(
    conn: &Connection,
    username: &str,
    plain_password: &str,
) -> rusqlite::Result<Option<User>> {
    let Some(user) = find_user_by_username(conn, username)? else {
        return Ok(None);
    };
    if password::verify_password(plain_password, &user.password_hash) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Overwrite the stored digest only after the old password re-verifies.
/// Returns false when the user is missing or the old password is wrong.
pub fn update_password(
    conn: &Connection,
    user_id: &str,
    old_password: &str,
    new_password: &str,
) -> rusqlite::Result<bool> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE id = ?",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        return Ok(false);
    };
    if !password::verify_password(old_password, &stored) {
        return Ok(false);
    }
    let changed = conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (&password::hash_password(new_password), user_id),
    )?;
    Ok(changed > 0)
}

fn course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        teacher: row.get(3)?,
        day_of_week: row.get(4)?,
        period_slot: row.get(5)?,
        location: row.get(6)?,
        week: row.get(7)?,
    })
}

const COURSE_COLUMNS: &str =
    "id, user_id, name, teacher, day_of_week, period_slot, location, week";

pub fn insert_course(conn: &Connection, row: &NewCourse<'_>) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    let inserted = conn.execute(
        "INSERT INTO courses(id, user_id, name, teacher, day_of_week, period_slot,
                             location, week, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            row.owner_id,
            row.name,
            row.teacher,
            row.day_of_week,
            row.period_slot,
            row.location,
            row.week as i64,
            Utc::now().to_rfc3339(),
        ),
    );
    match inserted {
        Ok(_) => Ok(id),
        Err(e) if is_unique_violation(&e) => Err(StoreError::SlotTaken),
        Err(e) => Err(StoreError::Db(e)),
    }
}

/// All courses of one (owner, week), in render order: day, then period,
/// then name. The grid walks this list directly.
pub fn courses_for_week(
    conn: &Connection,
    owner_id: &str,
    week: u8,
) -> rusqlite::Result<Vec<Course>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE user_id = ? AND week = ?"
    ))?;
    let mut rows = stmt
        .query_map((owner_id, week as i64), course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by(|a, b| {
        (a.day_of_week, a.period_slot, &a.name).cmp(&(b.day_of_week, b.period_slot, &b.name))
    });
    Ok(rows)
}

/// Every course owned by the user across the whole term, week order first.
pub fn courses_for_owner(conn: &Connection, owner_id: &str) -> rusqlite::Result<Vec<Course>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE user_id = ?"
    ))?;
    let mut rows = stmt
        .query_map([owner_id], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by(|a, b| {
        (a.week, a.day_of_week, a.period_slot, &a.name)
            .cmp(&(b.week, b.day_of_week, b.period_slot, &b.name))
    });
    Ok(rows)
}

/// Exact-match delete on the 5-tuple that identifies a scheduled slot.
/// A bulk-scheduled course has no shared identity across weeks, so removing
/// a multi-week course takes one call per week. Returns rows removed.
pub fn delete_course_exact(
    conn: &Connection,
    owner_id: &str,
    name: &str,
    day: Weekday,
    period: PeriodSlot,
    week: u8,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM courses
         WHERE user_id = ? AND name = ? AND day_of_week = ? AND period_slot = ? AND week = ?",
        (owner_id, name, day, period, week as i64),
    )
}
