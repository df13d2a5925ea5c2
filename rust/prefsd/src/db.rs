use crate::backend::{PreferenceBackend, SaveOutcome};
use crate::model::{
    CatalogFilter, PreferenceEntry, PreferenceRecord, Proficiency, Subject, SubjectId,
    Willingness,
};
use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "prefs.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            strand TEXT,
            grade_level TEXT
        )",
        [],
    )?;
    // Early workspaces stored only code/name/strand/grade.
    ensure_subjects_detail_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_code ON subjects(code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_preferences(
            id TEXT PRIMARY KEY,
            professor_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            proficiency TEXT NOT NULL,
            willingness TEXT,
            updated_at TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(professor_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_preferences_professor ON subject_preferences(professor_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_assignments(
            id TEXT PRIMARY KEY,
            professor_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            assigned_at TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(professor_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_assignments_professor ON subject_assignments(professor_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_subjects_detail_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "subjects", "units")? {
        conn.execute("ALTER TABLE subjects ADD COLUMN units REAL", [])?;
    }
    if !table_has_column(conn, "subjects", "subject_type")? {
        conn.execute("ALTER TABLE subjects ADD COLUMN subject_type TEXT", [])?;
    }
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

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Workspace-local stand-in for the remote subject/preference service.
pub struct SqliteBackend<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBackend<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert_subjects(&self, subjects: &[Subject]) -> anyhow::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for s in subjects {
            tx.execute(
                "INSERT INTO subjects(id, code, name, strand, grade_level, units, subject_type)
                 VALUES(?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                   code = excluded.code,
                   name = excluded.name,
                   strand = excluded.strand,
                   grade_level = excluded.grade_level,
                   units = excluded.units,
                   subject_type = excluded.subject_type",
                (
                    s.id,
                    &s.code,
                    &s.name,
                    &s.strand,
                    &s.grade_level,
                    s.units,
                    &s.subject_type,
                ),
            )
            .with_context(|| format!("failed to upsert subject {}", s.id))?;
        }
        tx.commit()?;
        Ok(subjects.len())
    }

    /// Replace-all write of one professor's rows. Willingness may be unset, as in
    /// preferences imported from older records.
    pub fn replace_preferences(
        &self,
        professor_id: i64,
        entries: &[PreferenceEntry],
    ) -> anyhow::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM subject_preferences WHERE professor_id = ?",
            [professor_id],
        )?;
        let updated_at = now_rfc3339();
        for e in entries {
            tx.execute(
                "INSERT INTO subject_preferences(id, professor_id, subject_id, proficiency, willingness, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    professor_id,
                    e.subject_id,
                    e.proficiency.as_str(),
                    e.willingness.map(Willingness::as_str),
                    &updated_at,
                ),
            )
            .with_context(|| format!("failed to save preference for subject {}", e.subject_id))?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// Ids from `ids` with no row in the catalog, ascending.
    pub fn missing_subjects(&self, ids: &[SubjectId]) -> anyhow::Result<Vec<SubjectId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM subjects WHERE id = ?")?;
        let mut missing = Vec::new();
        for id in ids {
            if !stmt.exists([id])? {
                missing.push(*id);
            }
        }
        missing.sort_unstable();
        missing.dedup();
        Ok(missing)
    }

    /// Replaces the administrator-side assignment list for one professor.
    pub fn set_assignments(&self, professor_id: i64, ids: &[SubjectId]) -> anyhow::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM subject_assignments WHERE professor_id = ?",
            [professor_id],
        )?;
        let assigned_at = now_rfc3339();
        for id in ids {
            tx.execute(
                "INSERT INTO subject_assignments(id, professor_id, subject_id, assigned_at)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(professor_id, subject_id) DO NOTHING",
                (Uuid::new_v4().to_string(), professor_id, id, &assigned_at),
            )
            .with_context(|| format!("failed to assign subject {}", id))?;
        }
        tx.commit()?;
        Ok(ids.len())
    }
}

impl PreferenceBackend for SqliteBackend<'_> {
    fn load_catalog(&self, filter: &CatalogFilter) -> anyhow::Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, strand, grade_level, units, subject_type
             FROM subjects
             ORDER BY code, name, id",
        )?;
        let subjects = stmt
            .query_map([], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    code: row.get(1)?,
                    name: row.get(2)?,
                    strand: row.get(3)?,
                    grade_level: row.get(4)?,
                    units: row.get(5)?,
                    subject_type: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read subjects")?;
        Ok(subjects.into_iter().filter(|s| filter.matches(s)).collect())
    }

    fn load_persisted_preferences(
        &self,
        professor_id: i64,
    ) -> anyhow::Result<Vec<PreferenceEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, proficiency, willingness
             FROM subject_preferences
             WHERE professor_id = ?
             ORDER BY subject_id",
        )?;
        let rows = stmt
            .query_map([professor_id], |row| {
                Ok((
                    row.get::<_, SubjectId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read subject preferences")?;

        let mut out = Vec::with_capacity(rows.len());
        for (subject_id, proficiency, willingness) in rows {
            let Some(proficiency) = Proficiency::parse(&proficiency) else {
                warn!(professor_id, subject_id, %proficiency, "dropping preference with unknown proficiency");
                continue;
            };
            out.push(PreferenceEntry {
                subject_id,
                proficiency,
                willingness: willingness.as_deref().and_then(Willingness::parse),
            });
        }
        Ok(out)
    }

    fn load_locked_assignments(&self, professor_id: i64) -> anyhow::Result<Vec<SubjectId>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id FROM subject_assignments WHERE professor_id = ? ORDER BY subject_id",
        )?;
        let ids = stmt
            .query_map([professor_id], |row| row.get::<_, SubjectId>(0))?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read subject assignments")?;
        Ok(ids)
    }

    fn save_preferences(
        &mut self,
        professor_id: i64,
        records: &[PreferenceRecord],
    ) -> anyhow::Result<SaveOutcome> {
        let ids: Vec<SubjectId> = records.iter().map(|r| r.subject_id).collect();
        let missing = self.missing_subjects(&ids)?;
        if !missing.is_empty() {
            warn!(professor_id, ?missing, "save refers to subjects no longer offered");
            let list = missing
                .iter()
                .map(|id| format!("#{id}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(SaveOutcome::rejected(format!(
                "Some selected subjects are no longer offered ({list}). Remove them and try again."
            )));
        }
        let entries: Vec<PreferenceEntry> = records
            .iter()
            .map(|r| PreferenceEntry {
                subject_id: r.subject_id,
                proficiency: r.proficiency,
                willingness: Some(r.willingness),
            })
            .collect();
        self.replace_preferences(professor_id, &entries)?;
        Ok(SaveOutcome::ok())
    }
}
