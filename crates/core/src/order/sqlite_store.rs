//! SQLite-backed order store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CreateOrderRequest, DesignAsset, Order, OrderAuditRow, OrderError, OrderFilter, OrderStore,
    StatusHistoryEntry, TransitionCommit,
};
use crate::db;
use crate::order::OrderStatus;

const ORDER_COLUMNS: &str = "id, workspace_id, production_method, status, deadline, priority_modifier, version, created_at, updated_at";

/// SQLite-backed order store.
///
/// Owns the `orders` table plus the append-only `order_audit_log` and
/// `order_status_history` tables, so a transition commits in one transaction.
pub struct SqliteOrderStore {
    conn: Mutex<Connection>,
}

impl SqliteOrderStore {
    /// Create a new SQLite order store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, OrderError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite order store (useful for testing).
    pub fn in_memory() -> Result<Self, OrderError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OrderError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL,
                production_method TEXT NOT NULL,
                status TEXT NOT NULL,
                deadline TEXT NOT NULL,
                priority_modifier INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            CREATE INDEX IF NOT EXISTS idx_orders_workspace ON orders(workspace_id);

            CREATE TABLE IF NOT EXISTS order_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                action TEXT NOT NULL,
                before_state TEXT NOT NULL,
                after_state TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_order_audit_order ON order_audit_log(order_id);

            CREATE TABLE IF NOT EXISTS order_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id TEXT NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                role TEXT NOT NULL,
                notes TEXT,
                changed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_order_history_order ON order_status_history(order_id);

            CREATE TABLE IF NOT EXISTS design_assets (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_design_assets_order ON design_assets(order_id);
            "#,
        )?;
        Ok(())
    }

    fn build_where_clause(filter: &OrderFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(ref workspace_id) = filter.workspace_id {
            conditions.push("workspace_id = ?");
            params.push(Box::new(workspace_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let method: String = row.get(2)?;
        let status: String = row.get(3)?;
        let deadline: String = row.get(4)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(Order {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            production_method: db::parsed(2, &method)?,
            status: db::parsed(3, &status)?,
            deadline: db::timestamp(4, &deadline)?,
            priority_modifier: row.get(5)?,
            version: row.get(6)?,
            created_at: db::timestamp(7, &created_at)?,
            updated_at: db::timestamp(8, &updated_at)?,
        })
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Order>, OrderError> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Self::row_to_order)
            .optional()?)
    }
}

impl OrderStore for SqliteOrderStore {
    fn create(&self, request: CreateOrderRequest, at: DateTime<Utc>) -> Result<Order, OrderError> {
        let conn = self.conn.lock().unwrap();

        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: request.workspace_id,
            production_method: request.production_method,
            status: OrderStatus::Intake,
            deadline: request.deadline,
            priority_modifier: request.priority_modifier,
            version: 0,
            created_at: at,
            updated_at: at,
        };

        conn.execute(
            "INSERT INTO orders (id, workspace_id, production_method, status, deadline, priority_modifier, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                order.id,
                order.workspace_id,
                order.production_method.as_str(),
                order.status.as_str(),
                db::format_timestamp(&order.deadline),
                order.priority_modifier,
                order.version,
                db::format_timestamp(&order.created_at),
                db::format_timestamp(&order.updated_at),
            ],
        )?;

        Ok(order)
    }

    fn get(&self, id: &str) -> Result<Option<Order>, OrderError> {
        let conn = self.conn.lock().unwrap();
        Self::load(&conn, id)
    }

    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM orders {} ORDER BY deadline ASC, created_at ASC LIMIT ? OFFSET ?",
            ORDER_COLUMNS, where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_order)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?);
        }
        Ok(orders)
    }

    fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM orders {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        Ok(conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?)
    }

    fn commit_transition(&self, commit: &TransitionCommit) -> Result<Order, OrderError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current = Self::load(&tx, &commit.order_id)?
            .ok_or_else(|| OrderError::NotFound(commit.order_id.clone()))?;

        if current.version != commit.expected_version || current.status != commit.from {
            return Err(OrderError::VersionConflict {
                order_id: commit.order_id.clone(),
                expected: commit.expected_version,
                actual: current.version,
            });
        }

        let updated = tx.execute(
            "UPDATE orders SET status = ?, version = version + 1, updated_at = ? WHERE id = ? AND version = ?",
            params![
                commit.to.as_str(),
                db::format_timestamp(&commit.at),
                commit.order_id,
                commit.expected_version,
            ],
        )?;
        if updated == 0 {
            return Err(OrderError::VersionConflict {
                order_id: commit.order_id.clone(),
                expected: commit.expected_version,
                actual: current.version,
            });
        }

        let after = Order {
            status: commit.to,
            version: current.version + 1,
            updated_at: commit.at,
            ..current.clone()
        };

        let before_json = serde_json::to_string(&current)
            .map_err(|e| OrderError::Serialization(e.to_string()))?;
        let after_json =
            serde_json::to_string(&after).map_err(|e| OrderError::Serialization(e.to_string()))?;

        tx.execute(
            "INSERT INTO order_audit_log (order_id, actor_id, action, before_state, after_state, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                commit.order_id,
                commit.actor_id,
                format!("status_change:{}->{}", commit.from, commit.to),
                before_json,
                after_json,
                db::format_timestamp(&commit.at),
            ],
        )?;

        tx.execute(
            "INSERT INTO order_status_history (order_id, from_status, to_status, changed_by, role, notes, changed_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                commit.order_id,
                commit.from.as_str(),
                commit.to.as_str(),
                commit.actor_id,
                commit.role.as_str(),
                commit.notes,
                db::format_timestamp(&commit.at),
            ],
        )?;

        tx.commit()?;
        Ok(after)
    }

    fn status_history(&self, order_id: &str) -> Result<Vec<StatusHistoryEntry>, OrderError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, order_id, from_status, to_status, changed_by, role, notes, changed_at FROM order_status_history WHERE order_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![order_id], |row| {
            let from: String = row.get(2)?;
            let to: String = row.get(3)?;
            let role: String = row.get(5)?;
            let changed_at: String = row.get(7)?;
            Ok(StatusHistoryEntry {
                id: row.get(0)?,
                order_id: row.get(1)?,
                from_status: db::parsed(2, &from)?,
                to_status: db::parsed(3, &to)?,
                changed_by: row.get(4)?,
                role: db::parsed(5, &role)?,
                notes: row.get(6)?,
                changed_at: db::timestamp(7, &changed_at)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn audit_rows(&self, order_id: &str) -> Result<Vec<OrderAuditRow>, OrderError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, order_id, actor_id, action, before_state, after_state, created_at FROM order_audit_log WHERE order_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![order_id], |row| {
            let before: String = row.get(4)?;
            let after: String = row.get(5)?;
            let created_at: String = row.get(6)?;
            Ok(OrderAuditRow {
                id: row.get(0)?,
                order_id: row.get(1)?,
                actor_id: row.get(2)?,
                action: row.get(3)?,
                before: db::json(4, &before)?,
                after: db::json(5, &after)?,
                created_at: db::timestamp(6, &created_at)?,
            })
        })?;

        let mut audit = Vec::new();
        for row in rows {
            audit.push(row?);
        }
        Ok(audit)
    }

    fn add_design_asset(
        &self,
        order_id: &str,
        file_name: &str,
        uploaded_by: &str,
        at: DateTime<Utc>,
    ) -> Result<DesignAsset, OrderError> {
        let conn = self.conn.lock().unwrap();

        if Self::load(&conn, order_id)?.is_none() {
            return Err(OrderError::NotFound(order_id.to_string()));
        }

        let asset = DesignAsset {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            file_name: file_name.to_string(),
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: at,
        };

        conn.execute(
            "INSERT INTO design_assets (id, order_id, file_name, uploaded_by, uploaded_at) VALUES (?, ?, ?, ?, ?)",
            params![
                asset.id,
                asset.order_id,
                asset.file_name,
                asset.uploaded_by,
                db::format_timestamp(&asset.uploaded_at),
            ],
        )?;

        Ok(asset)
    }

    fn count_design_assets(&self, order_id: &str) -> Result<i64, OrderError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM design_assets WHERE order_id = ?",
            params![order_id],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Role;
    use crate::pipeline::ProductionMethod;
    use chrono::Duration;

    fn create_test_store() -> SqliteOrderStore {
        SqliteOrderStore::in_memory().unwrap()
    }

    fn create_test_request() -> CreateOrderRequest {
        CreateOrderRequest {
            workspace_id: "ws-1".to_string(),
            production_method: ProductionMethod::Silkscreen,
            deadline: Utc::now() + Duration::days(5),
            priority_modifier: 0,
        }
    }

    fn commit_for(order: &Order, to: OrderStatus) -> TransitionCommit {
        TransitionCommit {
            order_id: order.id.clone(),
            expected_version: order.version,
            from: order.status,
            to,
            actor_id: "user-1".to_string(),
            role: Role::Manager,
            notes: Some("moving on".to_string()),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_create_order_starts_in_intake() {
        let store = create_test_store();
        let order = store.create(create_test_request(), Utc::now()).unwrap();

        assert!(!order.id.is_empty());
        assert_eq!(order.status, OrderStatus::Intake);
        assert_eq!(order.version, 0);

        let fetched = store.get(&order.id).unwrap().unwrap();
        assert_eq!(fetched.production_method, ProductionMethod::Silkscreen);
        assert_eq!(fetched.deadline.timestamp(), order.deadline.timestamp());
    }

    #[test]
    fn test_get_nonexistent_order() {
        let store = create_test_store();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_commit_transition_writes_history_and_audit() {
        let store = create_test_store();
        let order = store.create(create_test_request(), Utc::now()).unwrap();

        let updated = store
            .commit_transition(&commit_for(&order, OrderStatus::DesignPending))
            .unwrap();
        assert_eq!(updated.status, OrderStatus::DesignPending);
        assert_eq!(updated.version, 1);

        let history = store.status_history(&order.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, OrderStatus::Intake);
        assert_eq!(history[0].to_status, OrderStatus::DesignPending);
        assert_eq!(history[0].role, Role::Manager);
        assert_eq!(history[0].notes.as_deref(), Some("moving on"));

        let audit = store.audit_rows(&order.id).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].before["status"], "intake");
        assert_eq!(audit[0].after["status"], "design_pending");
    }

    #[test]
    fn test_stale_version_is_rejected_without_side_effects() {
        let store = create_test_store();
        let order = store.create(create_test_request(), Utc::now()).unwrap();

        store
            .commit_transition(&commit_for(&order, OrderStatus::DesignPending))
            .unwrap();

        // Second writer still holds the version-0 snapshot.
        let result = store.commit_transition(&commit_for(&order, OrderStatus::DesignPending));
        assert!(matches!(
            result,
            Err(OrderError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert_eq!(store.status_history(&order.id).unwrap().len(), 1);
        assert_eq!(store.audit_rows(&order.id).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_unknown_order() {
        let store = create_test_store();
        let mut order = store.create(create_test_request(), Utc::now()).unwrap();
        order.id = "missing".to_string();
        let result = store.commit_transition(&commit_for(&order, OrderStatus::DesignPending));
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[test]
    fn test_list_and_count_by_status() {
        let store = create_test_store();
        let first = store.create(create_test_request(), Utc::now()).unwrap();
        store.create(create_test_request(), Utc::now()).unwrap();
        store
            .commit_transition(&commit_for(&first, OrderStatus::DesignPending))
            .unwrap();

        let filter = OrderFilter::new().with_status(OrderStatus::Intake);
        assert_eq!(store.list(&filter).unwrap().len(), 1);
        assert_eq!(store.count(&filter).unwrap(), 1);
        assert_eq!(store.count(&OrderFilter::new()).unwrap(), 2);
    }

    #[test]
    fn test_design_assets() {
        let store = create_test_store();
        let order = store.create(create_test_request(), Utc::now()).unwrap();
        assert_eq!(store.count_design_assets(&order.id).unwrap(), 0);

        store
            .add_design_asset(&order.id, "front.png", "artist-1", Utc::now())
            .unwrap();
        assert_eq!(store.count_design_assets(&order.id).unwrap(), 1);

        let result = store.add_design_asset("missing", "x.png", "artist-1", Utc::now());
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("orders.db");

        let store = SqliteOrderStore::new(&db_path).unwrap();
        let order = store.create(create_test_request(), Utc::now()).unwrap();

        assert!(db_path.exists());
        assert!(store.get(&order.id).unwrap().is_some());
    }

    #[test]
    fn test_create_stamps_caller_time() {
        let store = create_test_store();
        let at = DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let order = store.create(create_test_request(), at).unwrap();
        let stored = store.get(&order.id).unwrap().unwrap();
        assert_eq!(stored.created_at, at);
        assert_eq!(stored.updated_at, at);

        let asset = store
            .add_design_asset(&order.id, "back.png", "artist-1", at)
            .unwrap();
        assert_eq!(asset.uploaded_at, at);
    }
}
