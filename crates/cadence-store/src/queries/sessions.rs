use cadence_types::{
    Session, SessionKind, SessionMetrics, SessionPhase, SessionScope, SessionStatus,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, parse_ts_opt, to_ts};
use crate::{Error, Result};

const COLUMNS: &str = "id, project_name, kind, start_time, estimated_end, end_time, \
     phase, status, scope, context_budget, context_used, metrics";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawSession> {
    Ok(RawSession {
        id: row.get(0)?,
        project_name: row.get(1)?,
        kind: row.get(2)?,
        start_time: row.get(3)?,
        estimated_end: row.get(4)?,
        end_time: row.get(5)?,
        phase: row.get(6)?,
        status: row.get(7)?,
        scope: row.get(8)?,
        context_budget: row.get(9)?,
        context_used: row.get(10)?,
        metrics: row.get(11)?,
    })
}

struct RawSession {
    id: String,
    project_name: String,
    kind: String,
    start_time: String,
    estimated_end: Option<String>,
    end_time: Option<String>,
    phase: String,
    status: String,
    scope: String,
    context_budget: i64,
    context_used: i64,
    metrics: String,
}

impl RawSession {
    fn into_session(self) -> Result<Session> {
        Ok(Session {
            kind: SessionKind::parse(&self.kind)
                .ok_or_else(|| Error::Corrupt(format!("bad session kind '{}'", self.kind)))?,
            phase: SessionPhase::parse(&self.phase)
                .ok_or_else(|| Error::Corrupt(format!("bad session phase '{}'", self.phase)))?,
            status: SessionStatus::parse(&self.status)
                .ok_or_else(|| Error::Corrupt(format!("bad session status '{}'", self.status)))?,
            start_time: parse_ts(&self.start_time)?,
            estimated_end: parse_ts_opt(self.estimated_end)?,
            end_time: parse_ts_opt(self.end_time)?,
            scope: serde_json::from_str::<SessionScope>(&self.scope)?,
            metrics: serde_json::from_str::<SessionMetrics>(&self.metrics)?,
            context_budget: self.context_budget.max(0) as u64,
            context_used: self.context_used.max(0) as u64,
            id: self.id,
            project: self.project_name,
        })
    }
}

pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sessions (id, project_name, kind, start_time, estimated_end, end_time,
                              phase, status, scope, context_budget, context_used, metrics)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            &session.id,
            &session.project,
            session.kind.as_str(),
            to_ts(&session.start_time),
            session.estimated_end.as_ref().map(to_ts),
            session.end_time.as_ref().map(to_ts),
            session.phase.as_str(),
            session.status.as_str(),
            serde_json::to_string(&session.scope)?,
            session.context_budget as i64,
            session.context_used as i64,
            serde_json::to_string(&session.metrics)?,
        ],
    )?;

    Ok(())
}

pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM sessions WHERE id = ?1", COLUMNS),
            [session_id],
            from_row,
        )
        .optional()?;

    raw.map(RawSession::into_session).transpose()
}

/// The data model permits several active sessions; the newest start_time is
/// canonical everywhere "the active session" is read.
pub fn latest_active(conn: &Connection, project: Option<&str>) -> Result<Option<Session>> {
    let raw = match project {
        Some(name) => conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions \
                     WHERE status = 'active' AND project_name = ?1 \
                     ORDER BY start_time DESC LIMIT 1",
                    COLUMNS
                ),
                [name],
                from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions WHERE status = 'active' \
                     ORDER BY start_time DESC LIMIT 1",
                    COLUMNS
                ),
                [],
                from_row,
            )
            .optional()?,
    };

    raw.map(RawSession::into_session).transpose()
}

pub fn list(conn: &Connection, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
    let mut out = Vec::new();

    match project {
        Some(name) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sessions WHERE project_name = ?1 \
                 ORDER BY start_time DESC LIMIT ?2",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![name, limit as i64], from_row)?;
            for raw in rows {
                out.push(raw?.into_session()?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sessions ORDER BY start_time DESC LIMIT ?1",
                COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], from_row)?;
            for raw in rows {
                out.push(raw?.into_session()?);
            }
        }
    }

    Ok(out)
}

pub fn list_in_range(
    conn: &Connection,
    project: &str,
    since: Option<&str>,
    limit: usize,
) -> Result<Vec<Session>> {
    let mut out = Vec::new();
    let since = since.unwrap_or("");
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sessions \
         WHERE project_name = ?1 AND start_time >= ?2 \
         ORDER BY start_time DESC LIMIT ?3",
        COLUMNS
    ))?;
    let rows = stmt.query_map(params![project, since, limit as i64], from_row)?;
    for raw in rows {
        out.push(raw?.into_session()?);
    }

    Ok(out)
}

pub fn update_usage(
    conn: &Connection,
    session_id: &str,
    context_used: u64,
    phase: SessionPhase,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET context_used = ?2, phase = ?3 WHERE id = ?1",
        params![session_id, context_used as i64, phase.as_str()],
    )?;

    Ok(())
}

pub fn update_status(
    conn: &Connection,
    session_id: &str,
    status: SessionStatus,
    end_time: Option<&chrono::DateTime<chrono::Utc>>,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET status = ?2, end_time = COALESCE(?3, end_time) WHERE id = ?1",
        params![session_id, status.as_str(), end_time.map(to_ts)],
    )?;

    Ok(())
}

pub fn update_metrics(conn: &Connection, session_id: &str, metrics: &SessionMetrics) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET metrics = ?2 WHERE id = ?1",
        params![session_id, serde_json::to_string(metrics)?],
    )?;

    Ok(())
}
