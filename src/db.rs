use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "timetable.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    apply_schema(&conn)?;
    Ok(conn)
}

/// Create tables and indexes, then run the in-place column shims for
/// workspaces created before the current schema.
pub fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // The UNIQUE index over the slot tuple is what makes the engine's
    // check-then-insert safe: a duplicate slot fails the insert instead of
    // silently landing next to the row the pre-check missed.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            teacher TEXT NOT NULL,
            day_of_week TEXT NOT NULL,
            period_slot TEXT NOT NULL,
            location TEXT NOT NULL,
            week INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id),
            UNIQUE(user_id, day_of_week, period_slot, week)
        )",
        [],
    )?;

    // Single-week workspaces predate the week column. Add and backfill.
    ensure_courses_week(conn)?;
    ensure_courses_created_at(conn)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_user_week ON courses(user_id, week)",
        [],
    )?;

    Ok(())
}

fn ensure_courses_week(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "week")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE courses ADD COLUMN week INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn ensure_courses_created_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "created_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE courses ADD COLUMN created_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
