use crate::errors::{AppError, AppResult};
use crate::models::{PricingInputs, PricingResult};
use crate::state::DbCommand;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type DbPool = Arc<Mutex<Connection>>;

pub fn init_db(data_dir: &Path) -> AppResult<DbPool> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("bsm_heatmap.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    apply_schema(&conn)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory store with the same schema, for tests and ephemeral runs.
pub fn open_in_memory() -> AppResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    apply_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn apply_schema(conn: &Connection) -> AppResult<()> {
    let schema = include_str!("../migrations/001_init.sql");
    conn.execute_batch(schema)?;
    Ok(())
}

/// Dedicated DB writer task. Reads commands from bounded channel, executes SQL.
/// A failed write is logged and dropped; it never reaches the pricing path.
pub async fn run_db_writer(db: DbPool, mut rx: mpsc::Receiver<DbCommand>) {
    tracing::info!("db writer task started");

    while let Some(cmd) = rx.recv().await {
        if let Err(e) = execute_command(&db, cmd) {
            tracing::error!("db write error: {e}");
        }
    }

    tracing::info!("db writer task shutting down");
}

fn is_history_column(name: &str) -> bool {
    PricingInputs::FIELD_NAMES
        .iter()
        .chain(PricingResult::FIELD_NAMES.iter())
        .any(|col| *col == name)
}

pub(crate) fn execute_command(db: &DbPool, cmd: DbCommand) -> AppResult<()> {
    let conn = db.lock().map_err(|e| AppError::Database(format!("lock poisoned: {e}")))?;

    match cmd {
        DbCommand::InsertCalculation { id, created_at, fields } => {
            if let Some((name, _)) = fields.iter().find(|(name, _)| !is_history_column(name)) {
                return Err(AppError::Database(format!("unknown history column: {name}")));
            }

            let columns: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
            let placeholders: Vec<String> = (1..=fields.len() + 2).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO calculations (id, created_at, {}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", "),
            );

            let mut values = Vec::with_capacity(fields.len() + 2);
            values.push(Value::Text(id));
            values.push(Value::Text(created_at));
            values.extend(fields.iter().map(|(_, v)| Value::Real(*v)));

            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        }
    }
    Ok(())
}

// ── Query helpers (for REST reads, cold path) ──

pub fn get_recent_calculations(db: &DbPool, limit: usize) -> AppResult<Vec<CalculationRow>> {
    let conn = db.lock().map_err(|e| AppError::Database(format!("lock: {e}")))?;
    let mut stmt = conn.prepare(
        "SELECT id, created_at, current_price, strike, time_to_maturity, volatility, interest_rate, \
         call_price, put_price, delta_call, delta_put, gamma_call, gamma_put, vega_call, vega_put, \
         theta_call, theta_put, rho_call, rho_put \
         FROM calculations ORDER BY created_at DESC, rowid DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
        Ok(CalculationRow {
            id: row.get(0)?,
            created_at: row.get(1)?,
            inputs: PricingInputs {
                spot: row.get(2)?,
                strike: row.get(3)?,
                time_to_maturity: row.get(4)?,
                volatility: row.get(5)?,
                interest_rate: row.get(6)?,
            },
            result: PricingResult {
                call_price: row.get(7)?,
                put_price: row.get(8)?,
                delta_call: row.get(9)?,
                delta_put: row.get(10)?,
                gamma_call: row.get(11)?,
                gamma_put: row.get(12)?,
                vega_call: row.get(13)?,
                vega_put: row.get(14)?,
                theta_call: row.get(15)?,
                theta_put: row.get(16)?,
                rho_call: row.get(17)?,
                rho_put: row.get(18)?,
            },
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Row types ──

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CalculationRow {
    pub id: String,
    pub created_at: String,
    pub inputs: PricingInputs,
    pub result: PricingResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::price;
    use crate::state::CalculationEvent;

    fn event(id: &str, ts: &str, spot: f64) -> CalculationEvent {
        let inputs = PricingInputs::new(spot, 100.0, 1.0, 0.2, 0.05);
        CalculationEvent {
            id: id.into(),
            timestamp: ts.into(),
            inputs,
            result: price(&inputs).unwrap(),
        }
    }

    #[test]
    fn test_calculation_round_trip() {
        let db = open_in_memory().unwrap();
        let ev = event("a", "2026-10-14T10:00:00+00:00", 100.0);
        execute_command(&db, DbCommand::calculation(&ev)).unwrap();

        let rows = get_recent_calculations(&db, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[0].inputs, ev.inputs);
        assert_eq!(rows[0].result, ev.result);
    }

    #[test]
    fn test_recent_first_and_limited() {
        let db = open_in_memory().unwrap();
        for (i, ts) in ["2026-10-14T10:00:00+00:00", "2026-10-14T10:00:01+00:00", "2026-10-14T10:00:02+00:00"]
            .iter()
            .enumerate()
        {
            let ev = event(&format!("id{i}"), ts, 90.0 + i as f64);
            execute_command(&db, DbCommand::calculation(&ev)).unwrap();
        }
        let rows = get_recent_calculations(&db, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "id2");
        assert_eq!(rows[1].id, "id1");
    }

    #[test]
    fn test_unknown_column_rejected() {
        let db = open_in_memory().unwrap();
        let cmd = DbCommand::InsertCalculation {
            id: "bad".into(),
            created_at: "2026-10-14T10:00:00+00:00".into(),
            fields: vec![("current_price; DROP TABLE calculations", 1.0)],
        };
        assert!(matches!(execute_command(&db, cmd), Err(AppError::Database(_))));
        assert!(get_recent_calculations(&db, 10).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_id_is_an_error() {
        let db = open_in_memory().unwrap();
        let ev = event("dup", "2026-10-14T10:00:00+00:00", 100.0);
        execute_command(&db, DbCommand::calculation(&ev)).unwrap();
        assert!(execute_command(&db, DbCommand::calculation(&ev)).is_err());
    }

    #[test]
    fn test_init_db_on_file_path_is_io_error() {
        let path = std::env::temp_dir().join(format!("bsm_heatmap_{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"not a directory").unwrap();
        let err = init_db(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn test_init_db_creates_store_in_new_dir() {
        let dir = std::env::temp_dir().join(format!("bsm_heatmap_{}", uuid::Uuid::new_v4()));
        let db = init_db(&dir).unwrap();
        assert!(get_recent_calculations(&db, 1).unwrap().is_empty());
        drop(db);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
