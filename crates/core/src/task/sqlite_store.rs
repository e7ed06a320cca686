//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{NewTask, OperatorWorkload, Task, TaskError, TaskStatus, TaskStore};
use crate::db;
use crate::order::Role;

const TASK_COLUMNS: &str = "id, order_id, step_name, position, assigned_role, assigned_operator, status, paused_from, due_at, start_at, estimated_hours, priority, dependencies, required_skills, required, details, assigned_at, started_at, completed_at, created_at, updated_at";

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Create a new SQLite task store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite task store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                step_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                kind TEXT NOT NULL,
                assigned_role TEXT NOT NULL,
                assigned_operator TEXT,
                status TEXT NOT NULL,
                paused_from TEXT,
                due_at TEXT NOT NULL,
                start_at TEXT NOT NULL,
                estimated_hours REAL NOT NULL,
                priority INTEGER NOT NULL,
                dependencies TEXT NOT NULL DEFAULT '[]',
                required_skills TEXT NOT NULL DEFAULT '[]',
                required INTEGER NOT NULL DEFAULT 1,
                details TEXT NOT NULL,
                assigned_at TEXT,
                started_at TEXT,
                completed_at TEXT,
                last_attempted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (order_id, step_name)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_order ON tasks(order_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_operator ON tasks(assigned_operator, status);
            CREATE INDEX IF NOT EXISTS idx_tasks_unassigned ON tasks(status, priority DESC, due_at ASC)
                WHERE assigned_operator IS NULL;
            "#,
        )?;
        Ok(())
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let role: String = row.get(4)?;
        let status: String = row.get(6)?;
        let paused_from: Option<String> = row.get(7)?;
        let due_at: String = row.get(8)?;
        let start_at: String = row.get(9)?;
        let dependencies: String = row.get(12)?;
        let required_skills: String = row.get(13)?;
        let details: String = row.get(15)?;
        let created_at: String = row.get(19)?;
        let updated_at: String = row.get(20)?;

        Ok(Task {
            id: row.get(0)?,
            order_id: row.get(1)?,
            step_name: row.get(2)?,
            position: row.get(3)?,
            assigned_role: db::parsed(4, &role)?,
            assigned_operator: row.get(5)?,
            status: db::parsed(6, &status)?,
            paused_from: paused_from.map(|s| db::parsed(7, &s)).transpose()?,
            due_at: db::timestamp(8, &due_at)?,
            start_at: db::timestamp(9, &start_at)?,
            estimated_hours: row.get(10)?,
            priority: row.get(11)?,
            dependencies: db::json(12, &dependencies)?,
            required_skills: db::json(13, &required_skills)?,
            required: row.get(14)?,
            details: db::json(15, &details)?,
            assigned_at: db::optional_timestamp(16, row.get(16)?)?,
            started_at: db::optional_timestamp(17, row.get(17)?)?,
            completed_at: db::optional_timestamp(18, row.get(18)?)?,
            created_at: db::timestamp(19, &created_at)?,
            updated_at: db::timestamp(20, &updated_at)?,
        })
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Task>, TaskError> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_task)
            .optional()?)
    }

    fn query_tasks(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Task>, TaskError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_task)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Insert one task. Returns `None` if the order already has the step.
    fn insert(
        conn: &Connection,
        new: NewTask,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskError> {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: new.order_id,
            step_name: new.step_name,
            position: new.position,
            assigned_role: new.assigned_role,
            assigned_operator: None,
            status: TaskStatus::Pending,
            paused_from: None,
            due_at: new.due_at,
            start_at: new.start_at,
            estimated_hours: new.estimated_hours,
            priority: new.priority,
            dependencies: new.dependencies,
            required_skills: new.required_skills,
            required: new.required,
            details: new.details,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tasks (id, order_id, step_name, position, kind, assigned_role, status, due_at, start_at, estimated_hours, priority, dependencies, required_skills, required, details, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.id,
                task.order_id,
                task.step_name,
                task.position,
                task.details.kind(),
                task.assigned_role.as_str(),
                task.status.as_str(),
                db::format_timestamp(&task.due_at),
                db::format_timestamp(&task.start_at),
                task.estimated_hours,
                task.priority,
                serde_json::to_string(&task.dependencies)?,
                serde_json::to_string(&task.required_skills)?,
                task.required,
                serde_json::to_string(&task.details)?,
                db::format_timestamp(&task.created_at),
                db::format_timestamp(&task.updated_at),
            ],
        )?;

        Ok(if inserted == 0 { None } else { Some(task) })
    }
}

impl TaskStore for SqliteTaskStore {
    fn replace_pipeline(
        &self,
        order_id: &str,
        tasks: Vec<NewTask>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM tasks WHERE order_id = ? AND kind = 'pipeline_step'",
            params![order_id],
        )?;

        let mut created = Vec::with_capacity(tasks.len());
        for new in tasks {
            let step_name = new.step_name.clone();
            match Self::insert(&tx, new, at)? {
                Some(task) => created.push(task),
                None => {
                    return Err(TaskError::Database(format!(
                        "step {} already exists for order {}",
                        step_name, order_id
                    )))
                }
            }
        }

        tx.commit()?;
        Ok(created)
    }

    fn insert_triggered(
        &self,
        task: NewTask,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskError> {
        let conn = self.conn.lock().unwrap();
        Self::insert(&conn, task, at)
    }

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        let conn = self.conn.lock().unwrap();
        Self::load(&conn, id)
    }

    fn list_for_order(&self, order_id: &str) -> Result<Vec<Task>, TaskError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM tasks WHERE order_id = ? ORDER BY kind ASC, position ASC, created_at ASC",
            TASK_COLUMNS
        );
        Self::query_tasks(&conn, &sql, params![order_id])
    }

    fn list_assignable(&self, limit: usize) -> Result<Vec<Task>, TaskError> {
        let conn = self.conn.lock().unwrap();
        // A dependency is outstanding while the order has no completed task
        // with that step name.
        let sql = format!(
            r#"
            SELECT {} FROM tasks t
            WHERE t.status = 'pending'
              AND t.assigned_operator IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM json_each(t.dependencies) d
                  WHERE NOT EXISTS (
                      SELECT 1 FROM tasks c
                      WHERE c.order_id = t.order_id
                        AND c.step_name = d.value
                        AND c.status = 'completed'
                  )
              )
            ORDER BY t.last_attempted_at IS NOT NULL, t.last_attempted_at ASC,
                     t.priority DESC, t.due_at ASC
            LIMIT ?
            "#,
            TASK_COLUMNS
        );
        let limit = limit as i64;
        Self::query_tasks(&conn, &sql, params![limit])
    }

    fn mark_attempted(&self, task_id: &str, at: DateTime<Utc>) -> Result<(), TaskError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET last_attempted_at = ? WHERE id = ?",
            params![db::format_timestamp(&at), task_id],
        )?;
        Ok(())
    }

    fn count_unassigned_pending(&self) -> Result<i64, TaskError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = 'pending' AND assigned_operator IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    fn assign_if_unassigned(
        &self,
        task_id: &str,
        operator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, TaskError> {
        let conn = self.conn.lock().unwrap();
        let at = db::format_timestamp(&at);
        let updated = conn.execute(
            "UPDATE tasks SET assigned_operator = ?, assigned_at = ?, updated_at = ? WHERE id = ? AND assigned_operator IS NULL AND status != 'completed'",
            params![operator_id, at, at, task_id],
        )?;
        Ok(updated == 1)
    }

    fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let conn = self.conn.lock().unwrap();

        let task =
            Self::load(&conn, task_id)?.ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        if task.status == TaskStatus::Completed {
            return Err(TaskError::AlreadyCompleted(task_id.to_string()));
        }

        let allowed = matches!(
            (task.status, status),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Completed)
        );
        if !allowed {
            return Err(TaskError::InvalidStatusChange {
                task_id: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }

        let at_str = db::format_timestamp(&at);
        match status {
            TaskStatus::InProgress => conn.execute(
                "UPDATE tasks SET status = ?, started_at = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), at_str, at_str, task_id],
            )?,
            _ => conn.execute(
                "UPDATE tasks SET status = ?, completed_at = ?, started_at = COALESCE(started_at, ?), updated_at = ? WHERE id = ?",
                params![status.as_str(), at_str, at_str, at_str, task_id],
            )?,
        };

        Self::load(&conn, task_id)?.ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    fn pause_open_for_order(&self, order_id: &str, at: DateTime<Utc>) -> Result<usize, TaskError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "UPDATE tasks SET paused_from = status, status = 'on_hold', updated_at = ? WHERE order_id = ? AND status IN ('pending', 'in_progress')",
            params![db::format_timestamp(&at), order_id],
        )?)
    }

    fn resume_for_order(&self, order_id: &str, at: DateTime<Utc>) -> Result<usize, TaskError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "UPDATE tasks SET status = COALESCE(paused_from, 'pending'), paused_from = NULL, updated_at = ? WHERE order_id = ? AND status = 'on_hold'",
            params![db::format_timestamp(&at), order_id],
        )?)
    }

    fn reassign_role(
        &self,
        order_id: &str,
        from: Role,
        to: Role,
        at: DateTime<Utc>,
    ) -> Result<usize, TaskError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "UPDATE tasks SET assigned_role = ?, assigned_operator = NULL, assigned_at = NULL, last_attempted_at = NULL, updated_at = ? WHERE order_id = ? AND assigned_role = ? AND status = 'pending'",
            params![to.as_str(), db::format_timestamp(&at), order_id, from.as_str()],
        )?)
    }

    fn operator_workload(
        &self,
        operator_id: &str,
        completed_since: DateTime<Utc>,
    ) -> Result<OperatorWorkload, TaskError> {
        let conn = self.conn.lock().unwrap();

        let (open_tasks, open_hours): (i64, f64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(estimated_hours), 0.0) FROM tasks WHERE assigned_operator = ? AND status IN ('pending', 'in_progress')",
            params![operator_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let completed_recent: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE assigned_operator = ? AND status = 'completed' AND completed_at >= ?",
            params![operator_id, db::format_timestamp(&completed_since)],
            |row| row.get(0),
        )?;

        Ok(OperatorWorkload {
            open_tasks: open_tasks as u32,
            open_hours,
            completed_recent: completed_recent as u32,
        })
    }
}
