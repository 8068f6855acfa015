use crate::models::{DashboardStats, HistoryRecord, ScanSummary, TrendPoint};
use eyre::Result;
use rusqlite::{params, Connection};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS history (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  scan_date       TEXT NOT NULL,
  filename        TEXT NOT NULL,
  total_scanned   INTEGER NOT NULL,
  fraud_found_xgb INTEGER NOT NULL,
  fraud_found_rf  INTEGER NOT NULL
);
"#;

/// Number of most recent scans plotted on the dashboard.
pub const TREND_WINDOW: i64 = 7;

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Append one scan summary and return its row id
pub fn insert_history(conn: &Connection, summary: &ScanSummary) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO history (scan_date, filename, total_scanned, fraud_found_xgb, fraud_found_rf)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            summary.scan_date,
            summary.filename,
            summary.total_scanned,
            summary.fraud_found_xgb,
            summary.fraud_found_rf
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All history rows, newest first
pub fn list_history(conn: &Connection) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, scan_date, filename, total_scanned, fraud_found_xgb, fraud_found_rf
         FROM history
         ORDER BY id DESC",
    )?;

    let rows = stmt.query_map([], |r| {
        Ok(HistoryRecord {
            id: r.get(0)?,
            scan_date: r.get(1)?,
            filename: r.get(2)?,
            total_scanned: r.get(3)?,
            fraud_found_xgb: r.get(4)?,
            fraud_found_rf: r.get(5)?,
        })
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn dashboard_stats(conn: &Connection) -> Result<DashboardStats> {
    let (total_scans, total_tx, total_fraud): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(total_scanned), 0), COALESCE(SUM(fraud_found_xgb), 0)
         FROM history",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT scan_date, fraud_found_xgb, fraud_found_rf
         FROM history
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let mut trend_data = stmt
        .query_map([TREND_WINDOW], |r| {
            let scan_date: String = r.get(0)?;
            // Keep only the YYYY-MM-DD part
            let name = scan_date
                .split(' ')
                .next()
                .unwrap_or_default()
                .to_string();
            Ok(TrendPoint {
                name,
                xgboost: r.get(1)?,
                random_forest: r.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // Oldest first so charts read left to right
    trend_data.reverse();

    Ok(DashboardStats {
        total_scans,
        total_tx,
        total_fraud,
        trend_data,
    })
}
