use rusqlite::{Connection, OptionalExtension, params};

use super::to_ts;
use crate::Result;

pub fn put(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
    now: &chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO ui_state (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
        "#,
        params![key, serde_json::to_string(value)?, to_ts(now)],
    )?;

    Ok(())
}

pub fn get(conn: &Connection, key: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM ui_state WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;

    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}
