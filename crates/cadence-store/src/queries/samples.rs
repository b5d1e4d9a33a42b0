use cadence_types::{ContextSample, SessionPhase};
use rusqlite::{Connection, Row, params};

use super::{parse_ts, to_ts};
use crate::{Error, Result};

fn from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, i64, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_sample(raw: (String, String, String, i64, String)) -> Result<ContextSample> {
    let (session_id, timestamp, phase, tokens, label) = raw;
    Ok(ContextSample {
        timestamp: parse_ts(&timestamp)?,
        phase: SessionPhase::parse(&phase)
            .ok_or_else(|| Error::Corrupt(format!("bad sample phase '{}'", phase)))?,
        tokens: tokens.max(0) as u64,
        session_id,
        label,
    })
}

pub fn insert(conn: &Connection, sample: &ContextSample) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO context_samples (session_id, timestamp, phase, tokens, label)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            &sample.session_id,
            to_ts(&sample.timestamp),
            sample.phase.as_str(),
            sample.tokens as i64,
            &sample.label,
        ],
    )?;

    Ok(())
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<ContextSample>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT session_id, timestamp, phase, tokens, label
        FROM context_samples
        WHERE session_id = ?1
        ORDER BY timestamp, id
        "#,
    )?;

    let rows = stmt.query_map([session_id], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(into_sample(raw?)?);
    }

    Ok(out)
}

pub fn total_tokens(conn: &Connection, session_id: &str) -> Result<u64> {
    let total: Option<i64> = conn.query_row(
        "SELECT SUM(tokens) FROM context_samples WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;

    Ok(total.unwrap_or(0).max(0) as u64)
}
