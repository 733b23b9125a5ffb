use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::pivot::PivotTable;

/// Saved pivot table, scoped to the identity that saved it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub table: PivotTable,
    pub created_at: DateTime<Utc>,
}

/// Listing entry - everything but the table payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub name: String,
    pub companies: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            companies: snapshot.table.len(),
            created_at: snapshot.created_at,
        }
    }
}

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Snapshots Table (pivot table stored as JSON, document order preserved)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            table_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_owner ON snapshots(owner_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

pub fn save_snapshot(
    conn: &Connection,
    owner_id: &str,
    name: &str,
    table: &PivotTable,
) -> Result<Snapshot> {
    let snapshot = Snapshot {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        table: table.clone(),
        created_at: Utc::now(),
    };

    let table_json = serde_json::to_string(&snapshot.table)?;

    conn.execute(
        "INSERT INTO snapshots (id, owner_id, name, table_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.id,
            snapshot.owner_id,
            snapshot.name,
            table_json,
            timestamp(&snapshot.created_at),
        ],
    )
    .context("Failed to insert snapshot")?;

    let event = Event::new(
        "snapshot_saved",
        "snapshot",
        &snapshot.id,
        serde_json::json!({
            "name": snapshot.name,
            "companies": snapshot.table.len(),
            "owners": snapshot.table.owners(),
        }),
        owner_id,
    );
    if let Err(e) = insert_event(conn, &event) {
        log::warn!("could not record snapshot_saved event: {}", e);
    }

    log::info!(
        "saved snapshot '{}' ({} companies) for {}",
        snapshot.name,
        snapshot.table.len(),
        owner_id
    );

    Ok(snapshot)
}

/// Snapshots saved by `owner_id`, newest first
pub fn list_snapshots(conn: &Connection, owner_id: &str) -> Result<Vec<Snapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, name, table_json, created_at
         FROM snapshots
         WHERE owner_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let snapshots = stmt
        .query_map([owner_id], row_to_snapshot)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(snapshots)
}

pub fn get_snapshot(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Snapshot>> {
    let snapshot = conn
        .query_row(
            "SELECT id, owner_id, name, table_json, created_at
             FROM snapshots
             WHERE owner_id = ?1 AND id = ?2",
            params![owner_id, id],
            row_to_snapshot,
        )
        .optional()?;

    Ok(snapshot)
}

/// Returns false when there was nothing to delete
pub fn delete_snapshot(conn: &Connection, owner_id: &str, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM snapshots WHERE owner_id = ?1 AND id = ?2",
        params![owner_id, id],
    )?;

    if deleted > 0 {
        let event = Event::new(
            "snapshot_deleted",
            "snapshot",
            id,
            serde_json::json!({}),
            owner_id,
        );
        if let Err(e) = insert_event(conn, &event) {
            log::warn!("could not record snapshot_deleted event: {}", e);
        }
    }

    Ok(deleted > 0)
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    let table_json: String = row.get(3)?;
    let created_at_str: String = row.get(4)?;

    // Stored tables are trusted; only the JSON shape is checked
    let table: PivotTable = serde_json::from_str(&table_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(Snapshot {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        table,
        created_at,
    })
}

/// Fixed-width timestamps so text ordering matches time ordering
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
