use rusqlite::Connection;

use crate::Result;

/// Current schema version; `PRAGMA user_version` tracks which migrations ran.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

// Migrations are forward-only and numbered by position. Never edit a shipped
// entry; append a new one.
//
// Foreign keys to sessions(id) are deliberately omitted for agent_decisions
// and symbols: advisory recording must survive session deletion, and agents
// may record decisions before a session exists.
const MIGRATIONS: &[&str] = &[
    // 1: initial schema
    r#"
    CREATE TABLE projects (
        name TEXT PRIMARY KEY,
        sessions_completed INTEGER NOT NULL DEFAULT 0,
        total_lines_written INTEGER NOT NULL DEFAULT 0,
        average_velocity REAL NOT NULL DEFAULT 0,
        completion_rate REAL NOT NULL DEFAULT 0,
        common_blockers TEXT NOT NULL DEFAULT '[]',
        tech_stack TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE sessions (
        id TEXT PRIMARY KEY,
        project_name TEXT NOT NULL REFERENCES projects(name),
        kind TEXT NOT NULL,
        start_time TEXT NOT NULL,
        estimated_end TEXT,
        end_time TEXT,
        phase TEXT NOT NULL,
        status TEXT NOT NULL,
        scope TEXT NOT NULL,
        context_budget INTEGER NOT NULL,
        context_used INTEGER NOT NULL DEFAULT 0,
        metrics TEXT NOT NULL
    );

    CREATE INDEX idx_sessions_project_start
        ON sessions(project_name, start_time DESC);

    CREATE TABLE checkpoints (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES sessions(id),
        checkpoint_number INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        context_used INTEGER NOT NULL,
        commit_hash TEXT,
        completed_components TEXT NOT NULL,
        metrics TEXT NOT NULL,
        continuation TEXT NOT NULL,
        UNIQUE (session_id, checkpoint_number)
    );

    CREATE INDEX idx_checkpoints_session
        ON checkpoints(session_id, checkpoint_number);

    CREATE TABLE context_samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES sessions(id),
        timestamp TEXT NOT NULL,
        phase TEXT NOT NULL,
        tokens INTEGER NOT NULL,
        label TEXT NOT NULL
    );

    CREATE INDEX idx_samples_session_ts
        ON context_samples(session_id, timestamp);

    CREATE TABLE reality_snapshots (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES sessions(id),
        timestamp TEXT NOT NULL,
        discrepancies TEXT NOT NULL,
        confidence INTEGER NOT NULL
    );

    CREATE TABLE blockers (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES sessions(id),
        project_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        description TEXT NOT NULL,
        impact INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        resolution TEXT,
        resolved_at TEXT,
        time_to_resolve_minutes INTEGER
    );

    CREATE TABLE symbols (
        id TEXT PRIMARY KEY,
        project_name TEXT NOT NULL,
        concept TEXT NOT NULL,
        chosen_name TEXT NOT NULL,
        context_type TEXT NOT NULL,
        confidence REAL NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 1,
        created_by_agent TEXT NOT NULL,
        session_id TEXT,
        created_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX idx_symbols_identity
        ON symbols(concept, context_type, project_name);

    CREATE TABLE agent_decisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_name TEXT NOT NULL,
        action_type TEXT NOT NULL,
        input_context TEXT NOT NULL,
        decision_made TEXT NOT NULL,
        outcome INTEGER,
        project_name TEXT NOT NULL,
        session_id TEXT,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX idx_decisions_lookup
        ON agent_decisions(agent_name, action_type, project_name);

    CREATE TABLE quick_actions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        steps TEXT NOT NULL,
        ui_group TEXT,
        shortcut TEXT,
        usage_count INTEGER NOT NULL DEFAULT 0,
        last_used TEXT
    );

    CREATE TABLE documents (
        path TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        generated_at TEXT NOT NULL,
        word_count INTEGER NOT NULL,
        sections TEXT NOT NULL,
        refs TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE ui_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
];

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, migration) in MIGRATIONS.iter().enumerate() {
        let version = index as i32 + 1;
        if version > current_version {
            conn.execute_batch(migration)?;
        }
    }

    if current_version != SCHEMA_VERSION {
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_to_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sessions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
