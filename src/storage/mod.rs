//! SQLite storage layer -- schema, inserts and recent-window queries.

pub mod memory;
pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::detect::IncidentDecision;
use crate::event::{LogRecord, MetricSample};
use crate::pipeline::{IncidentSink, LogSource, ObservationSink};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Single-connection pool over a private in-memory database.
pub fn open_memory_pool() -> Result<Pool> {
    let pool = R2D2Pool::builder()
        .max_size(1)
        .build(SqliteConnectionManager::memory())?;
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    Ok(pool)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn insert_metric_row(conn: &Connection, m: &MetricSample) -> Result<()> {
    conn.execute(
        "INSERT INTO metrics (ts, latency_ms, error_rate, cpu_pct, scenario)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![m.ts.to_rfc3339(), m.latency_ms, m.error_rate, m.cpu_pct, m.scenario],
    )
    .context("Failed to insert metric")?;
    Ok(())
}

fn insert_log_row(conn: &Connection, log: &LogRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO logs (ts, level, message, scenario) VALUES (?1, ?2, ?3, ?4)",
        params![log.ts.to_rfc3339(), log.level.to_string(), log.message, log.scenario],
    )
    .context("Failed to insert log")?;
    Ok(())
}

/// SQLite-backed store for metrics, logs and incidents.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn insert_metric(&self, m: &MetricSample) -> Result<()> {
        let conn = self.pool.get()?;
        insert_metric_row(&conn, m)
    }

    pub fn insert_log(&self, log: &LogRecord) -> Result<()> {
        let conn = self.pool.get()?;
        insert_log_row(&conn, log)
    }

    pub fn insert_incident(&self, i: &IncidentDecision) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO incidents (incident_id, ts, score, summary, top_cluster, sample_log, scenario)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                i.id.to_string(),
                i.ts.to_rfc3339(),
                i.score,
                i.summary,
                i.top_cluster,
                i.sample_log,
                i.scenario
            ],
        )
        .context("Failed to insert incident")?;
        Ok(())
    }

    /// Most recent `limit` metrics, oldest first.
    pub fn recent_metrics(&self, limit: usize) -> Result<Vec<MetricSample>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT ts, latency_ms, error_rate, cpu_pct, scenario
             FROM metrics ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(MetricSample {
                ts: parse_ts(0, &row.get::<_, String>(0)?)?,
                latency_ms: row.get(1)?,
                error_rate: row.get(2)?,
                cpu_pct: row.get(3)?,
                scenario: row.get(4)?,
            })
        })?;

        let mut metrics = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        metrics.reverse();
        Ok(metrics)
    }

    /// Most recent `limit` logs, oldest first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT ts, level, message, scenario FROM logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            let level: String = row.get(1)?;
            Ok(LogRecord {
                ts: parse_ts(0, &row.get::<_, String>(0)?)?,
                level: level.parse().map_err(|e: anyhow::Error| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                message: row.get(2)?,
                scenario: row.get(3)?,
            })
        })?;

        let mut logs = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        logs.reverse();
        Ok(logs)
    }

    /// Most recent `limit` incidents, oldest first.
    pub fn recent_incidents(&self, limit: usize) -> Result<Vec<IncidentDecision>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT incident_id, ts, score, summary, top_cluster, sample_log, scenario
             FROM incidents ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            let id: String = row.get(0)?;
            Ok(IncidentDecision {
                id: Uuid::parse_str(&id).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
                })?,
                ts: parse_ts(1, &row.get::<_, String>(1)?)?,
                score: row.get(2)?,
                summary: row.get(3)?,
                top_cluster: row.get(4)?,
                sample_log: row.get(5)?,
                scenario: row.get(6)?,
            })
        })?;

        let mut incidents = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        incidents.reverse();
        Ok(incidents)
    }
}

impl ObservationSink for SqliteStore {
    /// Metric and log land together or not at all.
    fn record_observation(&self, metric: &MetricSample, log: &LogRecord) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        insert_metric_row(&tx, metric)?;
        insert_log_row(&tx, log)?;
        tx.commit().context("Failed to commit observation")?;
        Ok(())
    }
}

impl IncidentSink for SqliteStore {
    fn record_incident(&self, incident: &IncidentDecision) -> Result<()> {
        self.insert_incident(incident)
    }
}

impl LogSource for SqliteStore {
    fn recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
        SqliteStore::recent_logs(self, limit)
    }
}
