use cadence_types::AgentDecision;
use rusqlite::{Connection, Row, params};

use super::{parse_ts, to_ts};
use crate::Result;

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawDecision> {
    Ok(RawDecision {
        agent_name: row.get(0)?,
        action_type: row.get(1)?,
        input_context: row.get(2)?,
        decision_made: row.get(3)?,
        outcome: row.get(4)?,
        project_name: row.get(5)?,
        session_id: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

struct RawDecision {
    agent_name: String,
    action_type: String,
    input_context: String,
    decision_made: String,
    outcome: Option<bool>,
    project_name: String,
    session_id: Option<String>,
    timestamp: String,
}

impl RawDecision {
    fn into_decision(self) -> Result<AgentDecision> {
        Ok(AgentDecision {
            timestamp: parse_ts(&self.timestamp)?,
            agent_name: self.agent_name,
            action_type: self.action_type,
            input_context: self.input_context,
            decision_made: self.decision_made,
            outcome: self.outcome,
            project: self.project_name,
            session_id: self.session_id,
        })
    }
}

pub fn insert(conn: &Connection, decision: &AgentDecision) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO agent_decisions (agent_name, action_type, input_context, decision_made,
                                     outcome, project_name, session_id, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            &decision.agent_name,
            &decision.action_type,
            &decision.input_context,
            &decision.decision_made,
            decision.outcome,
            &decision.project,
            &decision.session_id,
            to_ts(&decision.timestamp),
        ],
    )?;

    Ok(())
}

pub fn query(
    conn: &Connection,
    agent_name: Option<&str>,
    action_type: Option<&str>,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<AgentDecision>> {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(agent) = agent_name {
        where_clauses.push("agent_name = ?");
        params.push(Box::new(agent.to_string()));
    }
    if let Some(action) = action_type {
        where_clauses.push("action_type = ?");
        params.push(Box::new(action.to_string()));
    }
    if let Some(name) = project {
        where_clauses.push("project_name = ?");
        params.push(Box::new(name.to_string()));
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let query = format!(
        r#"
        SELECT agent_name, action_type, input_context, decision_made,
               outcome, project_name, session_id, timestamp
        FROM agent_decisions
        {}
        ORDER BY timestamp DESC
        LIMIT {}
        "#,
        where_clause, limit
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(param_refs.as_slice(), from_row)?;

    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_decision()?);
    }

    Ok(out)
}
