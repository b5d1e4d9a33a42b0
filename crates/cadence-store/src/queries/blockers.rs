use cadence_types::{Blocker, BlockerKind};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, parse_ts_opt, to_ts};
use crate::{Error, Result};

const COLUMNS: &str = "id, session_id, project_name, kind, description, impact, \
     created_at, resolution, resolved_at, time_to_resolve_minutes";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawBlocker> {
    Ok(RawBlocker {
        id: row.get(0)?,
        session_id: row.get(1)?,
        project_name: row.get(2)?,
        kind: row.get(3)?,
        description: row.get(4)?,
        impact: row.get(5)?,
        created_at: row.get(6)?,
        resolution: row.get(7)?,
        resolved_at: row.get(8)?,
        time_to_resolve_minutes: row.get(9)?,
    })
}

struct RawBlocker {
    id: String,
    session_id: String,
    project_name: String,
    kind: String,
    description: String,
    impact: i64,
    created_at: String,
    resolution: Option<String>,
    resolved_at: Option<String>,
    time_to_resolve_minutes: Option<i64>,
}

impl RawBlocker {
    fn into_blocker(self) -> Result<Blocker> {
        Ok(Blocker {
            kind: BlockerKind::parse(&self.kind)
                .ok_or_else(|| Error::Corrupt(format!("bad blocker kind '{}'", self.kind)))?,
            created_at: parse_ts(&self.created_at)?,
            resolved_at: parse_ts_opt(self.resolved_at)?,
            impact: self.impact.clamp(0, 10) as u8,
            id: self.id,
            session_id: self.session_id,
            project: self.project_name,
            description: self.description,
            resolution: self.resolution,
            time_to_resolve_minutes: self.time_to_resolve_minutes,
        })
    }
}

pub fn insert(conn: &Connection, blocker: &Blocker) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO blockers (id, session_id, project_name, kind, description, impact,
                              created_at, resolution, resolved_at, time_to_resolve_minutes)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            &blocker.id,
            &blocker.session_id,
            &blocker.project,
            blocker.kind.as_str(),
            &blocker.description,
            blocker.impact as i64,
            to_ts(&blocker.created_at),
            &blocker.resolution,
            blocker.resolved_at.as_ref().map(to_ts),
            blocker.time_to_resolve_minutes,
        ],
    )?;

    Ok(())
}

pub fn get_by_id(conn: &Connection, blocker_id: &str) -> Result<Option<Blocker>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM blockers WHERE id = ?1", COLUMNS),
            [blocker_id],
            from_row,
        )
        .optional()?;

    raw.map(RawBlocker::into_blocker).transpose()
}

pub fn resolve(
    conn: &Connection,
    blocker_id: &str,
    resolution: &str,
    resolved_at: &chrono::DateTime<chrono::Utc>,
    time_to_resolve_minutes: i64,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE blockers
        SET resolution = ?2, resolved_at = ?3, time_to_resolve_minutes = ?4
        WHERE id = ?1
        "#,
        params![
            blocker_id,
            resolution,
            to_ts(resolved_at),
            time_to_resolve_minutes
        ],
    )?;

    Ok(())
}

pub fn list_for_project(conn: &Connection, project: &str) -> Result<Vec<Blocker>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM blockers WHERE project_name = ?1 ORDER BY created_at DESC",
        COLUMNS
    ))?;

    let rows = stmt.query_map([project], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_blocker()?);
    }

    Ok(out)
}
