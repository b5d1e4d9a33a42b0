use cadence_types::{DocumentKind, DocumentMeta};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{parse_ts, to_ts};
use crate::{Error, Result};

const COLUMNS: &str = "path, session_id, kind, generated_at, word_count, sections, refs, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RawDocument> {
    Ok(RawDocument {
        path: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        generated_at: row.get(3)?,
        word_count: row.get(4)?,
        sections: row.get(5)?,
        refs: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

struct RawDocument {
    path: String,
    session_id: String,
    kind: String,
    generated_at: String,
    word_count: i64,
    sections: String,
    refs: String,
    updated_at: String,
}

impl RawDocument {
    fn into_meta(self) -> Result<DocumentMeta> {
        Ok(DocumentMeta {
            kind: DocumentKind::parse(&self.kind)
                .ok_or_else(|| Error::Corrupt(format!("bad document kind '{}'", self.kind)))?,
            generated_at: parse_ts(&self.generated_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            sections: serde_json::from_str(&self.sections)?,
            references: serde_json::from_str(&self.refs)?,
            word_count: self.word_count.max(0) as usize,
            path: self.path,
            session_id: self.session_id,
        })
    }
}

pub fn upsert(conn: &Connection, meta: &DocumentMeta) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO documents (path, session_id, kind, generated_at, word_count,
                               sections, refs, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(path) DO UPDATE SET
            session_id = ?2,
            kind = ?3,
            word_count = ?5,
            sections = ?6,
            refs = ?7,
            updated_at = ?8
        "#,
        params![
            &meta.path,
            &meta.session_id,
            meta.kind.as_str(),
            to_ts(&meta.generated_at),
            meta.word_count as i64,
            serde_json::to_string(&meta.sections)?,
            serde_json::to_string(&meta.references)?,
            to_ts(&meta.updated_at),
        ],
    )?;

    Ok(())
}

pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<DocumentMeta>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM documents WHERE path = ?1", COLUMNS),
            [path],
            from_row,
        )
        .optional()?;

    raw.map(RawDocument::into_meta).transpose()
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<DocumentMeta>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM documents WHERE session_id = ?1 ORDER BY updated_at DESC",
        COLUMNS
    ))?;

    let rows = stmt.query_map([session_id], from_row)?;
    let mut out = Vec::new();
    for raw in rows {
        out.push(raw?.into_meta()?);
    }

    Ok(out)
}

pub fn count_for_session(conn: &Connection, session_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE session_id = ?1",
        [session_id],
        |row| row.get(0),
    )?;

    Ok(count as usize)
}
