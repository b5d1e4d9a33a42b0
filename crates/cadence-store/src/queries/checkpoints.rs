use cadence_types::{Checkpoint, ContinuationPlan, SessionMetrics};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, to_ts};
use crate::Result;

const COLUMNS: &str = "id, session_id, checkpoint_number, timestamp, context_used, \
     commit_hash, completed_components, metrics, continuation";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawCheckpoint> {
    Ok(RawCheckpoint {
        id: row.get(0)?,
        session_id: row.get(1)?,
        checkpoint_number: row.get(2)?,
        timestamp: row.get(3)?,
        context_used: row.get(4)?,
        commit_hash: row.get(5)?,
        completed_components: row.get(6)?,
        metrics: row.get(7)?,
        continuation: row.get(8)?,
    })
}

struct RawCheckpoint {
    id: String,
    session_id: String,
    checkpoint_number: i64,
    timestamp: String,
    context_used: i64,
    commit_hash: Option<String>,
    completed_components: String,
    metrics: String,
    continuation: String,
}

impl RawCheckpoint {
    fn into_checkpoint(self) -> Result<Checkpoint> {
        Ok(Checkpoint {
            timestamp: parse_ts(&self.timestamp)?,
            completed_components: serde_json::from_str::<Vec<String>>(
                &self.completed_components,
            )?,
            metrics: serde_json::from_str::<SessionMetrics>(&self.metrics)?,
            continuation: serde_json::from_str::<ContinuationPlan>(&self.continuation)?,
            number: self.checkpoint_number.max(0) as u32,
            context_used: self.context_used.max(0) as u64,
            id: self.id,
            session_id: self.session_id,
            commit_hash: self.commit_hash,
        })
    }
}

pub fn insert(conn: &Connection, checkpoint: &Checkpoint) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO checkpoints (id, session_id, checkpoint_number, timestamp, context_used,
                                 commit_hash, completed_components, metrics, continuation)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            &checkpoint.id,
            &checkpoint.session_id,
            checkpoint.number as i64,
            to_ts(&checkpoint.timestamp),
            checkpoint.context_used as i64,
            &checkpoint.commit_hash,
            serde_json::to_string(&checkpoint.completed_components)?,
            serde_json::to_string(&checkpoint.metrics)?,
            serde_json::to_string(&checkpoint.continuation)?,
        ],
    )?;

    Ok(())
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Checkpoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM checkpoints WHERE session_id = ?1 ORDER BY checkpoint_number",
        COLUMNS
    ))?;

    let rows = stmt.query_map([session_id], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_checkpoint()?);
    }

    Ok(out)
}

pub fn latest_for_session(conn: &Connection, session_id: &str) -> Result<Option<Checkpoint>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM checkpoints WHERE session_id = ?1 \
                 ORDER BY checkpoint_number DESC LIMIT 1",
                COLUMNS
            ),
            [session_id],
            from_row,
        )
        .optional()?;

    raw.map(RawCheckpoint::into_checkpoint).transpose()
}

pub fn next_number(conn: &Connection, session_id: &str) -> Result<u32> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(checkpoint_number) FROM checkpoints WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;

    Ok(max.map(|n| n + 1).unwrap_or(0) as u32)
}
