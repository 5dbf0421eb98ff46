use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tracing::debug;

use super::relevance::{overlap_score, signature};
use super::{RecordCategory, ReflexionRecord};
use crate::error::Result;

/// How many recent rows a relevance query scans before ranking.
const RELEVANCE_SCAN_WINDOW: usize = 256;

/// SQLite-backed append-only reflexion log.
///
/// There is no UPDATE or DELETE path anywhere in this type; the only write
/// is an INSERT, so the audit-trail guarantee holds by construction.
pub struct EpisodicMemory {
    conn: Mutex<Connection>,
}

impl EpisodicMemory {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reflexions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                action TEXT NOT NULL,
                observation TEXT NOT NULL,
                category TEXT NOT NULL,
                evaluation_score REAL NOT NULL,
                reflection_text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reflexions_task ON reflexions(task_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE reflexions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                action TEXT NOT NULL,
                observation TEXT NOT NULL,
                category TEXT NOT NULL,
                evaluation_score REAL NOT NULL,
                reflection_text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX idx_reflexions_task ON reflexions(task_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Appends a record and returns it with its assigned row id.
    pub fn append(&self, record: ReflexionRecord) -> Result<ReflexionRecord> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reflexions
             (task_id, attempt, action, observation, category, evaluation_score, reflection_text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.task_id,
                record.attempt,
                record.action,
                record.observation,
                record.category.as_str(),
                record.evaluation_score,
                record.reflection_text,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(record_id = id, task_id = %record.task_id, category = %record.category, "Reflexion appended");
        Ok(ReflexionRecord { id, ..record })
    }

    /// Full chronological history for one task.
    pub fn history(&self, task_id: &str) -> Result<Vec<ReflexionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, attempt, action, observation, category, evaluation_score, reflection_text, timestamp
             FROM reflexions WHERE task_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![task_id], row_to_record)?;
        collect_rows(rows)
    }

    /// Most recent records across all tasks, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ReflexionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, attempt, action, observation, category, evaluation_score, reflection_text, timestamp
             FROM reflexions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        collect_rows(rows)
    }

    /// Top-k records ranked by token overlap against a query, recency as
    /// the tie-break. Scans a bounded window of recent rows.
    pub fn relevant(&self, query: &str, k: usize) -> Result<Vec<ReflexionRecord>> {
        let query_sig = signature(query);
        let mut candidates: Vec<(f64, ReflexionRecord)> = self
            .recent(RELEVANCE_SCAN_WINDOW)?
            .into_iter()
            .map(|r| {
                let text = format!("{} {} {}", r.action, r.observation, r.reflection_text);
                (overlap_score(&query_sig, &signature(&text)), r)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.id.cmp(&a.1.id))
        });
        Ok(candidates.into_iter().take(k).map(|(_, r)| r).collect())
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM reflexions", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Number of records of one category attached to a task. Used by the
    /// circuit-breaker audit ("exactly N corrective records").
    pub fn count_by_category(&self, task_id: &str, category: RecordCategory) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reflexions WHERE task_id = ?1 AND category = ?2",
            params![task_id, category.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReflexionRecord> {
    let category: String = row.get(5)?;
    let timestamp: String = row.get(8)?;
    Ok(ReflexionRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        attempt: row.get(2)?,
        action: row.get(3)?,
        observation: row.get(4)?,
        category: RecordCategory::parse(&category).unwrap_or(RecordCategory::Attempt),
        evaluation_score: row.get(6)?,
        reflection_text: row.get(7)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<ReflexionRecord>>,
) -> Result<Vec<ReflexionRecord>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
