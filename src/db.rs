use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("timetable.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Several sidecars may share one workspace; don't fail fast on a locked db.
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetables(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weekly_instances(
            id TEXT PRIMARY KEY,
            timetable_id TEXT NOT NULL,
            week_start TEXT NOT NULL,
            week_end TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(timetable_id, week_start),
            FOREIGN KEY(timetable_id) REFERENCES timetables(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_weekly_instances_timetable
         ON weekly_instances(timetable_id, week_start)",
        [],
    )?;

    // One row per bookable unit. Template rows have day_of_week and no
    // instance_id; instance rows have instance_id and schedule_date.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            timetable_id TEXT NOT NULL,
            instance_id TEXT,
            day_of_week TEXT,
            schedule_date TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            student_name TEXT NOT NULL,
            is_time_block INTEGER NOT NULL DEFAULT 0,
            is_on_leave INTEGER NOT NULL DEFAULT 0,
            leave_reason TEXT,
            note TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(timetable_id) REFERENCES timetables(id),
            FOREIGN KEY(instance_id) REFERENCES weekly_instances(id)
        )",
        [],
    )?;

    // Existing workspaces predate the trial-lesson marker. Add if needed.
    ensure_schedules_is_trial(&conn)?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_template
         ON schedules(timetable_id, day_of_week)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedules_instance
         ON schedules(instance_id, schedule_date)",
        [],
    )?;

    Ok(())
}

fn ensure_schedules_is_trial(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "schedules", "is_trial")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE schedules ADD COLUMN is_trial INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
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
