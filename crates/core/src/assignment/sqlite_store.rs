//! SQLite-backed operator store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{AssignmentRule, Operator, OperatorError, OperatorStore};
use crate::db;
use crate::order::Role;

/// SQLite-backed operator and assignment-rule store.
pub struct SqliteOperatorStore {
    conn: Mutex<Connection>,
}

impl SqliteOperatorStore {
    /// Create a new SQLite operator store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, OperatorError> {
        let conn = db::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite operator store (useful for testing).
    pub fn in_memory() -> Result<Self, OperatorError> {
        let conn = db::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OperatorError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS operators (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT NOT NULL,
                skills TEXT NOT NULL DEFAULT '[]',
                active INTEGER NOT NULL DEFAULT 1,
                last_assigned_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_operators_role ON operators(role);

            CREATE TABLE IF NOT EXISTS assignment_rules (
                role TEXT PRIMARY KEY,
                strategy TEXT NOT NULL,
                consider_workload INTEGER NOT NULL DEFAULT 0,
                consider_skills INTEGER NOT NULL DEFAULT 0,
                consider_efficiency INTEGER NOT NULL DEFAULT 0,
                consider_availability INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_operator(row: &rusqlite::Row) -> rusqlite::Result<Operator> {
        let role: String = row.get(2)?;
        let skills: String = row.get(3)?;
        Ok(Operator {
            id: row.get(0)?,
            name: row.get(1)?,
            role: db::parsed(2, &role)?,
            skills: db::json(3, &skills)?,
            active: row.get(4)?,
            last_assigned_at: db::optional_timestamp(5, row.get(5)?)?,
        })
    }

    fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<AssignmentRule> {
        let role: String = row.get(0)?;
        let strategy: String = row.get(1)?;
        Ok(AssignmentRule {
            role: db::parsed(0, &role)?,
            strategy: db::parsed(1, &strategy)?,
            consider_workload: row.get(2)?,
            consider_skills: row.get(3)?,
            consider_efficiency: row.get(4)?,
            consider_availability: row.get(5)?,
        })
    }
}

impl OperatorStore for SqliteOperatorStore {
    fn upsert_operator(&self, operator: &Operator) -> Result<(), OperatorError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO operators (id, name, role, skills, active, last_assigned_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                skills = excluded.skills,
                active = excluded.active
            "#,
            params![
                operator.id,
                operator.name,
                operator.role.as_str(),
                serde_json::to_string(&operator.skills)?,
                operator.active,
                operator.last_assigned_at.as_ref().map(db::format_timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_operator(&self, id: &str) -> Result<Option<Operator>, OperatorError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, name, role, skills, active, last_assigned_at FROM operators WHERE id = ?",
                params![id],
                Self::row_to_operator,
            )
            .optional()?)
    }

    fn list_by_role(&self, role: Role) -> Result<Vec<Operator>, OperatorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, role, skills, active, last_assigned_at FROM operators WHERE role = ? ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![role.as_str()], Self::row_to_operator)?;

        let mut operators = Vec::new();
        for row in rows {
            operators.push(row?);
        }
        Ok(operators)
    }

    fn set_active(&self, id: &str, active: bool) -> Result<(), OperatorError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE operators SET active = ? WHERE id = ?",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(OperatorError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn touch_last_assigned(&self, id: &str, at: DateTime<Utc>) -> Result<(), OperatorError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE operators SET last_assigned_at = ? WHERE id = ?",
            params![db::format_timestamp(&at), id],
        )?;
        if updated == 0 {
            return Err(OperatorError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn upsert_rule(&self, rule: &AssignmentRule) -> Result<(), OperatorError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO assignment_rules (role, strategy, consider_workload, consider_skills, consider_efficiency, consider_availability) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                rule.role.as_str(),
                rule.strategy.as_str(),
                rule.consider_workload,
                rule.consider_skills,
                rule.consider_efficiency,
                rule.consider_availability,
            ],
        )?;
        Ok(())
    }

    fn get_rule(&self, role: Role) -> Result<Option<AssignmentRule>, OperatorError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT role, strategy, consider_workload, consider_skills, consider_efficiency, consider_availability FROM assignment_rules WHERE role = ?",
                params![role.as_str()],
                Self::row_to_rule,
            )
            .optional()?)
    }

    fn list_rules(&self) -> Result<Vec<AssignmentRule>, OperatorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT role, strategy, consider_workload, consider_skills, consider_efficiency, consider_availability FROM assignment_rules ORDER BY role ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_rule)?;

        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::StrategyKind;

    fn create_test_store() -> SqliteOperatorStore {
        SqliteOperatorStore::in_memory().unwrap()
    }

    #[test]
    fn test_upsert_and_list_by_role_in_registration_order() {
        let store = create_test_store();
        store
            .upsert_operator(&Operator::new("p2", "Bea", Role::Printer).with_skills(&["dtf"]))
            .unwrap();
        store
            .upsert_operator(&Operator::new("p1", "Al", Role::Printer))
            .unwrap();
        store
            .upsert_operator(&Operator::new("c1", "Cy", Role::Cutter))
            .unwrap();

        let printers = store.list_by_role(Role::Printer).unwrap();
        let ids: Vec<_> = printers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(printers[0].skills, vec!["dtf"]);
    }

    #[test]
    fn test_upsert_preserves_last_assigned() {
        let store = create_test_store();
        let op = Operator::new("p1", "Al", Role::Printer);
        store.upsert_operator(&op).unwrap();

        let at = Utc::now();
        store.touch_last_assigned("p1", at).unwrap();

        let renamed = Operator {
            name: "Alan".to_string(),
            ..op
        };
        store.upsert_operator(&renamed).unwrap();

        let stored = store.get_operator("p1").unwrap().unwrap();
        assert_eq!(stored.name, "Alan");
        assert_eq!(
            stored.last_assigned_at.unwrap().timestamp_micros(),
            at.timestamp_micros()
        );
    }

    #[test]
    fn test_set_active_unknown_operator() {
        let store = create_test_store();
        let err = store.set_active("ghost", false).unwrap_err();
        assert!(matches!(err, OperatorError::NotFound(_)));
    }

    #[test]
    fn test_rules_round_trip_per_role() {
        let store = create_test_store();
        assert!(store.get_rule(Role::Printer).unwrap().is_none());

        let rule = AssignmentRule {
            role: Role::Printer,
            strategy: StrategyKind::SkillBased,
            consider_workload: true,
            consider_skills: true,
            consider_efficiency: false,
            consider_availability: true,
        };
        store.upsert_rule(&rule).unwrap();
        store
            .upsert_rule(&AssignmentRule {
                strategy: StrategyKind::RoundRobin,
                ..rule.clone()
            })
            .unwrap();

        let stored = store.get_rule(Role::Printer).unwrap().unwrap();
        assert_eq!(stored.strategy, StrategyKind::RoundRobin);
        assert_eq!(store.list_rules().unwrap().len(), 1);
    }
}
