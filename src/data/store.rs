use std::path::Path;

use anyhow::{Context, Result};
use jiff::civil::Date;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{Attendance, AttendanceKey, AttendanceRecord, MonitoredModule};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS module (
        id TEXT NOT NULL PRIMARY KEY
    ) STRICT;

    CREATE TABLE IF NOT EXISTS module_monitoring_window (
        module_id TEXT NOT NULL,
        ay INTEGER NOT NULL,
        week_num INTEGER NOT NULL,
        from_date TEXT NOT NULL,
        to_date TEXT NOT NULL,

        UNIQUE (module_id, ay, week_num),
        FOREIGN KEY (module_id) REFERENCES module(id)
    ) STRICT;
    CREATE INDEX IF NOT EXISTS module_monitoring_window_week
        ON module_monitoring_window(ay, week_num);

    CREATE TABLE IF NOT EXISTS student_course (
        user_id TEXT NOT NULL,
        course_code TEXT NOT NULL,
        \"primary\" TEXT NOT NULL
    ) STRICT;
    CREATE INDEX IF NOT EXISTS student_course_user ON student_course(user_id);

    CREATE TABLE IF NOT EXISTS att_by_module (
        id INTEGER PRIMARY KEY AUTOINCREMENT,

        att_user_id TEXT NOT NULL,
        mod_offer_name TEXT NOT NULL,
        week INTEGER NOT NULL,
        week_ay INTEGER NOT NULL,

        attendance TEXT NOT NULL,
        attended INTEGER NOT NULL,
        approved_absence INTEGER NOT NULL,
        total_events INTEGER NOT NULL,
        late_count INTEGER NOT NULL,

        user_id TEXT NOT NULL,
        ay INTEGER NOT NULL,
        course_code TEXT,

        UNIQUE (att_user_id, mod_offer_name, week, week_ay)
    ) STRICT;
    CREATE INDEX IF NOT EXISTS att_by_module_user ON att_by_module(user_id);
";

/// The attendance database: the `att_by_module` table this job owns, plus the
/// module and course membership tables it only reads.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create attendance tables")?;
        Ok(Self { conn })
    }

    /// Registers `module_id` as monitored for `week` of `ay`.
    pub fn add_monitoring_window(
        &self,
        module_id: &str,
        ay: u16,
        week: u8,
        from_date: Date,
        to_date: Date,
    ) -> Result<()> {
        self.conn
            .execute("INSERT OR IGNORE INTO module (id) VALUES (?1)", (module_id,))?;
        self.conn.execute(
            "INSERT INTO module_monitoring_window (module_id, ay, week_num, from_date, to_date)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (module_id, ay, week_num) DO UPDATE SET
                from_date = excluded.from_date,
                to_date = excluded.to_date",
            (
                module_id,
                ay,
                week,
                from_date.to_string(),
                to_date.to_string(),
            ),
        )?;
        Ok(())
    }

    pub fn add_course_membership(&self, user_id: &str, course_code: &str, primary: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO student_course (user_id, course_code, \"primary\") VALUES (?1, ?2, ?3)",
            (user_id, course_code, if primary { "Y" } else { "N" }),
        )?;
        Ok(())
    }

    /// Distinct modules monitored in `week` of `ay`, ordered by id.
    pub fn monitored_modules(&self, ay: u16, week: u8) -> Result<Vec<MonitoredModule>> {
        let modules = self
            .conn
            .prepare(
                "SELECT DISTINCT m.id, w.from_date, w.to_date
                FROM module m
                JOIN module_monitoring_window w ON w.module_id = m.id
                WHERE w.ay = ?1 AND w.week_num = ?2
                ORDER BY m.id",
            )
            .context("failed to prepare monitored modules SQL statement")?
            .query_and_then((ay, week), |row| {
                let from_date: String = row.get("from_date")?;
                let to_date: String = row.get("to_date")?;
                Ok(MonitoredModule {
                    id: row.get("id")?,
                    from_date: from_date.parse()?,
                    to_date: to_date.parse()?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(modules)
    }

    /// Deletes every attendance row and restarts the id sequence.
    pub fn purge_attendance(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM att_by_module", ())?;
        tx.execute("DELETE FROM sqlite_sequence WHERE name = 'att_by_module'", ())?;
        tx.commit()?;
        debug!(deleted, "purged attendance");
        Ok(deleted)
    }

    /// Inserts or overwrites the row at `key`. Returns true when a row was inserted.
    ///
    /// `course_code` is left alone on update; only the backfill writes it.
    pub fn upsert_attendance(&self, key: AttendanceKey, ay: u16, attendance: &Attendance) -> Result<bool> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM att_by_module
                WHERE att_user_id = ?1 AND mod_offer_name = ?2 AND week = ?3 AND week_ay = ?4",
                (key.student_id, key.module_id, key.week, key.week_ay),
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE att_by_module SET
                        attendance = ?1,
                        attended = ?2,
                        approved_absence = ?3,
                        total_events = ?4,
                        late_count = ?5,
                        user_id = ?6,
                        ay = ?7
                    WHERE id = ?8",
                    params![
                        attendance.attendance.to_string(),
                        attendance.attended,
                        attendance.approved_absence,
                        attendance.total_events,
                        attendance.late_count,
                        attendance.user_id(),
                        ay,
                        id,
                    ],
                )?;
                Ok(false)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO att_by_module (
                        att_user_id, mod_offer_name, week, week_ay,
                        attendance, attended, approved_absence, total_events, late_count,
                        user_id, ay
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        key.student_id,
                        key.module_id,
                        key.week,
                        key.week_ay,
                        attendance.attendance.to_string(),
                        attendance.attended,
                        attendance.approved_absence,
                        attendance.total_events,
                        attendance.late_count,
                        attendance.user_id(),
                        ay,
                    ],
                )?;
                Ok(true)
            }
        }
    }

    /// Copies each student's primary course code onto their attendance rows.
    /// Returns the number of rows touched.
    pub fn backfill_course_codes(&self) -> Result<usize> {
        let updated = self
            .conn
            .execute(
                "UPDATE att_by_module
                SET course_code = subquery.course_code
                FROM (
                    SELECT user_id, course_code FROM student_course WHERE \"primary\" = 'Y'
                ) AS subquery
                WHERE att_by_module.user_id = subquery.user_id",
                (),
            )
            .context("failed to backfill course codes")?;
        Ok(updated)
    }

    pub fn count_for_week(&self, week: u8, week_ay: u16) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM att_by_module WHERE week = ?1 AND week_ay = ?2",
            (week, week_ay),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_all(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM att_by_module", (), |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn attendance_for_week(&self, week: u8, week_ay: u16) -> Result<Vec<AttendanceRecord>> {
        let records = self
            .conn
            .prepare(
                "SELECT *
                FROM att_by_module
                WHERE week = ?1 AND week_ay = ?2
                ORDER BY id",
            )?
            .query_and_then((week, week_ay), |row| {
                let attendance: String = row.get("attendance")?;
                Ok(AttendanceRecord {
                    id: row.get("id")?,
                    att_user_id: row.get("att_user_id")?,
                    mod_offer_name: row.get("mod_offer_name")?,
                    week: row.get("week")?,
                    week_ay: row.get("week_ay")?,
                    attendance: attendance.parse()?,
                    attended: row.get("attended")?,
                    approved_absence: row.get("approved_absence")?,
                    total_events: row.get("total_events")?,
                    late_count: row.get("late_count")?,
                    user_id: row.get("user_id")?,
                    ay: row.get("ay")?,
                    course_code: row.get("course_code")?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(records)
    }
}
