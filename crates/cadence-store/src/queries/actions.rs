use cadence_types::{ActionStep, QuickAction};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts_opt, to_ts};
use crate::Result;

const COLUMNS: &str = "id, name, description, steps, ui_group, shortcut, usage_count, last_used";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawAction> {
    Ok(RawAction {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        steps: row.get(3)?,
        ui_group: row.get(4)?,
        shortcut: row.get(5)?,
        usage_count: row.get(6)?,
        last_used: row.get(7)?,
    })
}

struct RawAction {
    id: String,
    name: String,
    description: String,
    steps: String,
    ui_group: Option<String>,
    shortcut: Option<String>,
    usage_count: i64,
    last_used: Option<String>,
}

impl RawAction {
    fn into_action(self) -> Result<QuickAction> {
        Ok(QuickAction {
            steps: serde_json::from_str::<Vec<ActionStep>>(&self.steps)?,
            last_used: parse_ts_opt(self.last_used)?,
            id: self.id,
            name: self.name,
            description: self.description,
            group: self.ui_group,
            shortcut: self.shortcut,
            usage_count: self.usage_count,
        })
    }
}

pub fn insert(conn: &Connection, action: &QuickAction) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO quick_actions (id, name, description, steps, ui_group, shortcut,
                                   usage_count, last_used)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO NOTHING
        "#,
        params![
            &action.id,
            &action.name,
            &action.description,
            serde_json::to_string(&action.steps)?,
            &action.group,
            &action.shortcut,
            action.usage_count,
            action.last_used.as_ref().map(to_ts),
        ],
    )?;

    Ok(())
}

pub fn get_by_id(conn: &Connection, action_id: &str) -> Result<Option<QuickAction>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM quick_actions WHERE id = ?1", COLUMNS),
            [action_id],
            from_row,
        )
        .optional()?;

    raw.map(RawAction::into_action).transpose()
}

pub fn list(conn: &Connection) -> Result<Vec<QuickAction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM quick_actions ORDER BY usage_count DESC, name",
        COLUMNS
    ))?;

    let rows = stmt.query_map([], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_action()?);
    }

    Ok(out)
}

pub fn record_use(
    conn: &Connection,
    action_id: &str,
    used_at: &chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE quick_actions SET usage_count = usage_count + 1, last_used = ?2 WHERE id = ?1",
        params![action_id, to_ts(used_at)],
    )?;

    Ok(())
}
