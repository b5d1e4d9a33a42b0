use cadence_types::Project;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, to_ts};
use crate::Result;

const COLUMNS: &str = "name, sessions_completed, total_lines_written, average_velocity, \
     completion_rate, common_blockers, tech_stack, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawProject> {
    Ok(RawProject {
        name: row.get(0)?,
        sessions_completed: row.get(1)?,
        total_lines_written: row.get(2)?,
        average_velocity: row.get(3)?,
        completion_rate: row.get(4)?,
        common_blockers: row.get(5)?,
        tech_stack: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

struct RawProject {
    name: String,
    sessions_completed: i64,
    total_lines_written: i64,
    average_velocity: f64,
    completion_rate: f64,
    common_blockers: String,
    tech_stack: String,
    created_at: String,
    updated_at: String,
}

impl RawProject {
    fn into_project(self) -> Result<Project> {
        Ok(Project {
            common_blockers: serde_json::from_str(&self.common_blockers)?,
            tech_stack: serde_json::from_str(&self.tech_stack)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            name: self.name,
            sessions_completed: self.sessions_completed,
            total_lines_written: self.total_lines_written,
            average_velocity: self.average_velocity,
            completion_rate: self.completion_rate,
        })
    }
}

/// Projects are created implicitly on the first session for the name.
pub fn ensure(conn: &Connection, name: &str, now: &chrono::DateTime<chrono::Utc>) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO projects (name, created_at, updated_at)
        VALUES (?1, ?2, ?2)
        ON CONFLICT(name) DO NOTHING
        "#,
        params![name, to_ts(now)],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, name: &str) -> Result<Option<Project>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM projects WHERE name = ?1", COLUMNS),
            [name],
            from_row,
        )
        .optional()?;

    raw.map(RawProject::into_project).transpose()
}

pub fn list(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM projects ORDER BY updated_at DESC",
        COLUMNS
    ))?;

    let rows = stmt.query_map([], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_project()?);
    }

    Ok(out)
}

pub fn update_aggregates(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        r#"
        UPDATE projects SET
            sessions_completed = ?2,
            total_lines_written = ?3,
            average_velocity = ?4,
            completion_rate = ?5,
            common_blockers = ?6,
            tech_stack = ?7,
            updated_at = ?8
        WHERE name = ?1
        "#,
        params![
            &project.name,
            project.sessions_completed,
            project.total_lines_written,
            project.average_velocity,
            project.completion_rate,
            serde_json::to_string(&project.common_blockers)?,
            serde_json::to_string(&project.tech_stack)?,
            to_ts(&project.updated_at),
        ],
    )?;

    Ok(())
}
