//! SQLite-backed escalation job store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{EscalationError, EscalationJob, EscalationStore, JobState, NewEscalationJob};
use crate::db;
use crate::order::OrderStatus;

const JOB_COLUMNS: &str =
    "id, order_id, status, action, due_at, state, created_at, resolved_at, error";

/// SQLite-backed delayed-job table for escalations.
pub struct SqliteEscalationStore {
    conn: Mutex<Connection>,
}

impl SqliteEscalationStore {
    /// Create a new SQLite escalation store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, EscalationError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite escalation store (useful for testing).
    pub fn in_memory() -> Result<Self, EscalationError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), EscalationError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS escalation_jobs (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                status TEXT NOT NULL,
                action TEXT NOT NULL,
                due_at TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_escalation_jobs_due ON escalation_jobs(state, due_at);
            CREATE INDEX IF NOT EXISTS idx_escalation_jobs_order ON escalation_jobs(order_id, state);
            "#,
        )?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<EscalationJob> {
        let status: String = row.get(2)?;
        let action: String = row.get(3)?;
        let due_at: String = row.get(4)?;
        let state: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(EscalationJob {
            id: row.get(0)?,
            order_id: row.get(1)?,
            status: db::parsed(2, &status)?,
            action: db::json(3, &action)?,
            due_at: db::timestamp(4, &due_at)?,
            state: db::parsed(5, &state)?,
            created_at: db::timestamp(6, &created_at)?,
            resolved_at: db::optional_timestamp(7, row.get(7)?)?,
            error: row.get(8)?,
        })
    }

    fn query_jobs<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<EscalationJob>, EscalationError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_job)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }
}

impl EscalationStore for SqliteEscalationStore {
    fn schedule(
        &self,
        job: NewEscalationJob,
        at: DateTime<Utc>,
    ) -> Result<EscalationJob, EscalationError> {
        let scheduled = EscalationJob {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: job.order_id,
            status: job.status,
            action: job.action,
            due_at: job.due_at,
            state: JobState::Pending,
            created_at: at,
            resolved_at: None,
            error: None,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO escalation_jobs (id, order_id, status, action, due_at, state, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                scheduled.id,
                scheduled.order_id,
                scheduled.status.as_str(),
                serde_json::to_string(&scheduled.action)?,
                db::format_timestamp(&scheduled.due_at),
                scheduled.state.as_str(),
                db::format_timestamp(&scheduled.created_at),
            ],
        )?;
        Ok(scheduled)
    }

    fn get(&self, id: &str) -> Result<Option<EscalationJob>, EscalationError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM escalation_jobs WHERE id = ?", JOB_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_job)
            .optional()?)
    }

    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EscalationJob>, EscalationError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM escalation_jobs WHERE state = 'pending' AND due_at <= ? ORDER BY due_at ASC LIMIT ?",
            JOB_COLUMNS
        );
        let limit = limit as i64;
        Self::query_jobs(&conn, &sql, params![db::format_timestamp(&now), limit])
    }

    fn cancel_pending(
        &self,
        order_id: &str,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, EscalationError> {
        let conn = self.conn.lock().unwrap();
        let at_str = db::format_timestamp(&at);
        let cancelled = conn.execute(
            "UPDATE escalation_jobs SET state = 'cancelled', resolved_at = ? WHERE order_id = ? AND status = ? AND state = 'pending' AND due_at > ?",
            params![at_str, order_id, status.as_str(), at_str],
        )?;
        Ok(cancelled)
    }

    fn resolve(
        &self,
        id: &str,
        state: JobState,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE escalation_jobs SET state = ?, error = ?, resolved_at = ? WHERE id = ? AND state = 'pending'",
            params![state.as_str(), error, db::format_timestamp(&at), id],
        )?;
        if updated == 0 {
            return Err(EscalationError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_for_order(&self, order_id: &str) -> Result<Vec<EscalationJob>, EscalationError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM escalation_jobs WHERE order_id = ? ORDER BY due_at ASC",
            JOB_COLUMNS
        );
        Self::query_jobs(&conn, &sql, params![order_id])
    }

    fn count_pending(&self) -> Result<i64, EscalationError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM escalation_jobs WHERE state = 'pending'",
            [],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::EscalationAction;
    use crate::order::Role;
    use chrono::Duration;
    use tempfile::tempdir;

    fn create_test_store() -> SqliteEscalationStore {
        SqliteEscalationStore::in_memory().unwrap()
    }

    fn job(order_id: &str, status: OrderStatus, due_at: DateTime<Utc>) -> NewEscalationJob {
        NewEscalationJob {
            order_id: order_id.to_string(),
            status,
            action: EscalationAction::Notify {
                role: Role::Manager,
            },
            due_at,
        }
    }

    #[test]
    fn test_due_returns_only_pending_past_jobs() {
        let store = create_test_store();
        let now = Utc::now();
        let early = store
            .schedule(job("o1", OrderStatus::Qc, now - Duration::hours(2)), Utc::now())
            .unwrap();
        let later = store
            .schedule(job("o2", OrderStatus::Qc, now - Duration::hours(1)), Utc::now())
            .unwrap();
        store
            .schedule(job("o3", OrderStatus::Qc, now + Duration::hours(1)), Utc::now())
            .unwrap();

        let due = store.due(now, 10).unwrap();
        let ids: Vec<_> = due.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), later.id.as_str()]);

        store.resolve(&early.id, JobState::Fired, None, now).unwrap();
        assert_eq!(store.due(now, 10).unwrap().len(), 1);
        assert_eq!(store.count_pending().unwrap(), 2);
    }

    #[test]
    fn test_cancel_pending_only_matches_status() {
        let store = create_test_store();
        let now = Utc::now();
        let later = now + Duration::hours(1);
        store
            .schedule(job("o1", OrderStatus::DesignApproval, later), Utc::now())
            .unwrap();
        store.schedule(job("o1", OrderStatus::Qc, later), Utc::now()).unwrap();

        let cancelled = store
            .cancel_pending("o1", OrderStatus::DesignApproval, now)
            .unwrap();
        assert_eq!(cancelled, 1);

        let jobs = store.list_for_order("o1").unwrap();
        let states: Vec<_> = jobs.iter().map(|j| (j.status, j.state)).collect();
        assert!(states.contains(&(OrderStatus::DesignApproval, JobState::Cancelled)));
        assert!(states.contains(&(OrderStatus::Qc, JobState::Pending)));
    }

    #[test]
    fn test_cancel_leaves_due_jobs_to_the_sweep() {
        let store = create_test_store();
        let now = Utc::now();
        let due = store
            .schedule(job("o1", OrderStatus::Qc, now - Duration::minutes(5)), Utc::now())
            .unwrap();

        assert_eq!(store.cancel_pending("o1", OrderStatus::Qc, now).unwrap(), 0);
        assert_eq!(store.get(&due.id).unwrap().unwrap().state, JobState::Pending);
    }

    #[test]
    fn test_resolve_twice_fails() {
        let store = create_test_store();
        let now = Utc::now();
        let scheduled = store.schedule(job("o1", OrderStatus::Qc, now), Utc::now()).unwrap();

        store
            .resolve(&scheduled.id, JobState::Failed, Some("boom"), now)
            .unwrap();
        let err = store
            .resolve(&scheduled.id, JobState::Fired, None, now)
            .unwrap_err();
        assert!(matches!(err, EscalationError::NotFound(_)));

        let stored = store.get(&scheduled.id).unwrap().unwrap();
        assert_eq!(stored.state, JobState::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_jobs_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("escalations.db");
        let now = Utc::now();

        let id = {
            let store = SqliteEscalationStore::new(&path).unwrap();
            store.schedule(job("o1", OrderStatus::Qc, now), Utc::now()).unwrap().id
        };

        let store = SqliteEscalationStore::new(&path).unwrap();
        let due = store.due(now + Duration::seconds(1), 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        assert_eq!(
            due[0].action,
            EscalationAction::Notify {
                role: Role::Manager
            }
        );
    }
}
