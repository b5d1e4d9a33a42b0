use cadence_types::{Symbol, SymbolContextType};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, to_ts};
use crate::{Error, Result};

const COLUMNS: &str = "id, project_name, concept, chosen_name, context_type, confidence, \
     usage_count, created_by_agent, session_id, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawSymbol> {
    Ok(RawSymbol {
        id: row.get(0)?,
        project_name: row.get(1)?,
        concept: row.get(2)?,
        chosen_name: row.get(3)?,
        context_type: row.get(4)?,
        confidence: row.get(5)?,
        usage_count: row.get(6)?,
        created_by_agent: row.get(7)?,
        session_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

struct RawSymbol {
    id: String,
    project_name: String,
    concept: String,
    chosen_name: String,
    context_type: String,
    confidence: f64,
    usage_count: i64,
    created_by_agent: String,
    session_id: Option<String>,
    created_at: String,
}

impl RawSymbol {
    fn into_symbol(self) -> Result<Symbol> {
        Ok(Symbol {
            context_type: SymbolContextType::parse(&self.context_type).ok_or_else(|| {
                Error::Corrupt(format!("bad symbol context '{}'", self.context_type))
            })?,
            created_at: parse_ts(&self.created_at)?,
            id: self.id,
            project: self.project_name,
            concept: self.concept,
            chosen_name: self.chosen_name,
            confidence: self.confidence,
            usage_count: self.usage_count,
            created_by_agent: self.created_by_agent,
            session_id: self.session_id,
        })
    }
}

pub fn insert(conn: &Connection, symbol: &Symbol) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO symbols (id, project_name, concept, chosen_name, context_type, confidence,
                             usage_count, created_by_agent, session_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            &symbol.id,
            &symbol.project,
            &symbol.concept,
            &symbol.chosen_name,
            symbol.context_type.as_str(),
            symbol.confidence,
            symbol.usage_count,
            &symbol.created_by_agent,
            &symbol.session_id,
            to_ts(&symbol.created_at),
        ],
    )?;

    Ok(())
}

pub fn find(
    conn: &Connection,
    project: &str,
    concept: &str,
    context_type: SymbolContextType,
) -> Result<Option<Symbol>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM symbols \
                 WHERE project_name = ?1 AND concept = ?2 AND context_type = ?3",
                COLUMNS
            ),
            params![project, concept, context_type.as_str()],
            from_row,
        )
        .optional()?;

    raw.map(RawSymbol::into_symbol).transpose()
}

pub fn increment_usage(conn: &Connection, symbol_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE symbols SET usage_count = usage_count + 1 WHERE id = ?1",
        [symbol_id],
    )?;

    Ok(())
}

pub fn list_for_project(conn: &Connection, project: &str) -> Result<Vec<Symbol>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM symbols WHERE project_name = ?1 ORDER BY usage_count DESC, concept",
        COLUMNS
    ))?;

    let rows = stmt.query_map([project], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_symbol()?);
    }

    Ok(out)
}
