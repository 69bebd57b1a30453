//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS incidents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            severity TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            state_json TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            resolved_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS intervention_records (
            incident_id TEXT PRIMARY KEY,
            severity TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            record_json TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            finalized_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS action_outcomes (
            id INTEGER PRIMARY KEY,
            incident_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            action TEXT NOT NULL,
            result TEXT NOT NULL,
            outcome_json TEXT NOT NULL,
            attempted_at TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (incident_id, seq),
            FOREIGN KEY (incident_id) REFERENCES intervention_records(incident_id)
        );

        CREATE INDEX IF NOT EXISTS idx_incidents_detected ON incidents(detected_at);
        CREATE INDEX IF NOT EXISTS idx_records_detected ON intervention_records(detected_at);
        CREATE INDEX IF NOT EXISTS idx_outcomes_incident ON action_outcomes(incident_id);",
    )?;

    // Migration: track the resolution kind separately from the JSON blob
    let has_resolution: i32 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('intervention_records') WHERE name='resolution'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if has_resolution == 0 {
        conn.execute(
            "ALTER TABLE intervention_records ADD COLUMN resolution TEXT",
            [],
        )?;
    }

    Ok(())
}
