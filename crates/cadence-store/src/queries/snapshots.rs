use cadence_types::{Discrepancy, RealitySnapshot};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, to_ts};
use crate::Result;

fn from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_snapshot(raw: (String, String, String, String, i64)) -> Result<RealitySnapshot> {
    let (id, session_id, timestamp, discrepancies, confidence) = raw;
    Ok(RealitySnapshot {
        timestamp: parse_ts(&timestamp)?,
        discrepancies: serde_json::from_str::<Vec<Discrepancy>>(&discrepancies)?,
        confidence: confidence.clamp(0, 100) as u8,
        id,
        session_id,
    })
}

pub fn insert(conn: &Connection, snapshot: &RealitySnapshot) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO reality_snapshots (id, session_id, timestamp, discrepancies, confidence)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            &snapshot.id,
            &snapshot.session_id,
            to_ts(&snapshot.timestamp),
            serde_json::to_string(&snapshot.discrepancies)?,
            snapshot.confidence as i64,
        ],
    )?;

    Ok(())
}

pub fn get_by_id(conn: &Connection, snapshot_id: &str) -> Result<Option<RealitySnapshot>> {
    let raw = conn
        .query_row(
            r#"
            SELECT id, session_id, timestamp, discrepancies, confidence
            FROM reality_snapshots
            WHERE id = ?1
            "#,
            [snapshot_id],
            from_row,
        )
        .optional()?;

    raw.map(into_snapshot).transpose()
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<RealitySnapshot>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, timestamp, discrepancies, confidence
        FROM reality_snapshots
        WHERE session_id = ?1
        ORDER BY timestamp DESC
        "#,
    )?;

    let rows = stmt.query_map([session_id], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(into_snapshot(raw?)?);
    }

    Ok(out)
}
