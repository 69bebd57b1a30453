//! SQLite storage layer -- schema, queries, migrations.
//!
//! Persistence is optional: without a database path the engine keeps incidents
//! and intervention records in memory only.

pub mod schema;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::escalation::Incident;
use crate::intervention::{ActionOutcome, InterventionRecord};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| {
                    format!("failed to create database directory: {}", parent.display())
                })?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Insert or replace the summary row of an intervention record.
pub fn save_record(pool: &Pool, record: &InterventionRecord) -> Result<()> {
    let conn = pool.get()?;
    let record_json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO intervention_records (incident_id, severity, resolved, record_json, detected_at, finalized_at, resolution)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(incident_id) DO UPDATE SET
            resolved = excluded.resolved,
            record_json = excluded.record_json,
            finalized_at = excluded.finalized_at,
            resolution = excluded.resolution",
        params![
            record.incident_id.to_string(),
            record.severity.as_str(),
            record.resolved,
            record_json,
            record.detected_at.to_rfc3339(),
            record.finalized_at.map(|t| t.to_rfc3339()),
            record.resolution.map(|r| format!("{:?}", r)),
        ],
    )?;
    Ok(())
}

/// Append one action outcome row.
pub fn save_outcome(
    pool: &Pool,
    incident_id: Uuid,
    seq: usize,
    outcome: &ActionOutcome,
) -> Result<()> {
    let conn = pool.get()?;
    let outcome_json = serde_json::to_string(outcome)?;
    conn.execute(
        "INSERT INTO action_outcomes (incident_id, seq, action, result, outcome_json, attempted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            incident_id.to_string(),
            seq as i64,
            outcome.action.to_string(),
            outcome.result.as_str(),
            outcome_json,
            outcome.attempted_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Load a record and its outcomes. Outcome rows are authoritative over the
/// outcome list embedded in the summary row.
pub fn load_record(pool: &Pool, incident_id: Uuid) -> Result<Option<InterventionRecord>> {
    let conn = pool.get()?;
    let id = incident_id.to_string();

    let record_json: Option<String> = conn
        .query_row(
            "SELECT record_json FROM intervention_records WHERE incident_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(record_json) = record_json else {
        return Ok(None);
    };
    let mut record: InterventionRecord =
        serde_json::from_str(&record_json).context("corrupt intervention record row")?;

    let mut stmt = conn.prepare(
        "SELECT outcome_json FROM action_outcomes WHERE incident_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
    let mut outcomes = Vec::new();
    for r in rows {
        outcomes.push(serde_json::from_str(&r?).context("corrupt action outcome row")?);
    }
    record.outcomes = outcomes;

    Ok(Some(record))
}

/// Insert or replace an incident snapshot.
pub fn save_incident(pool: &Pool, incident: &Incident) -> Result<()> {
    let conn = pool.get()?;
    let state_json = serde_json::to_string(incident)?;
    conn.execute(
        "INSERT INTO incidents (id, user_id, severity, resolved, state_json, detected_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            resolved = excluded.resolved,
            state_json = excluded.state_json,
            resolved_at = excluded.resolved_at,
            updated_at = datetime('now')",
        params![
            incident.id.to_string(),
            incident.user_id,
            incident.assessment.severity.as_str(),
            incident.resolved,
            state_json,
            incident.detected_at.to_rfc3339(),
            incident.resolved_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn load_incident(pool: &Pool, id: Uuid) -> Result<Option<Incident>> {
    let conn = pool.get()?;
    let state_json: Option<String> = conn
        .query_row(
            "SELECT state_json FROM incidents WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    state_json
        .map(|json| serde_json::from_str(&json).context("corrupt incident row"))
        .transpose()
}
