mod templates;

pub(crate) use templates::{extract_sections, render, template_for, word_count};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cadence_types::{DocumentKind, DocumentMeta, DocumentUpdateMode, Error, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::observable::{ObservableRegistry, topics};
use crate::{SharedDb, with_db};

/// Result of a generate/update call: absolute path plus content stats
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub path: String,
    pub kind: DocumentKind,
    pub word_count: usize,
    pub sections: Vec<String>,
}

/// Per-path status report
#[derive(Debug, Clone, Serialize)]
pub struct DocStatus {
    pub path: String,
    pub exists: bool,
    pub word_count: usize,
    pub age_days: Option<i64>,
    pub stale: bool,
}

/// Template-driven document generation. Writes are synchronous with the
/// call; each change publishes `documentation.status`.
pub struct DocumentationEngine {
    db: SharedDb,
    observables: ObservableRegistry,
    docs_root: PathBuf,
}

impl DocumentationEngine {
    pub fn new(db: SharedDb, observables: ObservableRegistry, docs_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            observables,
            docs_root: docs_root.into(),
        }
    }

    pub fn docs_root(&self) -> &Path {
        &self.docs_root
    }

    /// Render a document of `kind` for the session. Substitution values come
    /// from the session row plus caller-provided context.
    pub fn generate(
        &self,
        session_id: &str,
        kind: DocumentKind,
        include_sections: Option<&[String]>,
        extra_context: HashMap<String, String>,
    ) -> Result<GeneratedDocument> {
        let session = with_db(&self.db, |db| db.session(session_id))?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let mut values = extra_context;
        values.insert("project".into(), session.project.clone());
        values.insert("session_id".into(), session.id.clone());
        values.insert("phase".into(), session.phase.as_str().to_string());
        values.insert("context_used".into(), session.context_used.to_string());
        values.insert("context_budget".into(), session.context_budget.to_string());
        values.insert(
            "usage_percent".into(),
            format!("{:.1}", session.usage_percent()),
        );
        values.insert(
            "lines_written".into(),
            session.metrics.lines_written.to_string(),
        );
        values.insert(
            "tests_passing".into(),
            session.metrics.tests_passing.to_string(),
        );

        let mut content = render(template_for(kind), &values);
        if let Some(only) = include_sections {
            content = filter_sections(&content, only);
        }

        let dir = self.docs_root.join(&session.id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("cannot create docs dir: {}", e)))?;
        let path = dir.join(format!("{}.md", kind.as_str()));
        std::fs::write(&path, &content)
            .map_err(|e| Error::Storage(format!("cannot write document: {}", e)))?;

        let generated = self.record(&path, session_id, kind, &content)?;
        info!(path = %generated.path, kind = kind.as_str(), "generated document");
        Ok(generated)
    }

    /// Update an existing document in place.
    pub fn update(
        &self,
        file_path: &str,
        mode: DocumentUpdateMode,
        context: Option<&str>,
    ) -> Result<GeneratedDocument> {
        let path = PathBuf::from(file_path);
        if !path.exists() {
            return Err(Error::DocumentNotFound(file_path.to_string()));
        }
        let existing = std::fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("cannot read document: {}", e)))?;

        let meta = with_db(&self.db, |db| db.document(file_path))?;
        let (session_id, kind) = match &meta {
            Some(m) => (m.session_id.clone(), m.kind),
            None => (String::new(), DocumentKind::Readme),
        };

        let content = match mode {
            DocumentUpdateMode::Append => {
                let addition = context.unwrap_or_default();
                format!("{}\n\n{}\n", existing.trim_end(), addition)
            }
            DocumentUpdateMode::Sync => {
                // Re-render from the template when the owning session is
                // known; otherwise keep the document and refresh metadata.
                if session_id.is_empty() {
                    existing.clone()
                } else {
                    let mut extra = HashMap::new();
                    if let Some(ctx) = context {
                        extra.insert("summary".to_string(), ctx.to_string());
                    }
                    return self.generate(&session_id, kind, None, extra);
                }
            }
            DocumentUpdateMode::Restructure => restructure(&existing),
        };

        std::fs::write(&path, &content)
            .map_err(|e| Error::Storage(format!("cannot write document: {}", e)))?;

        self.record(&path, &session_id, kind, &content)
    }

    /// Existence/word-count/staleness report for each path. Unknown paths
    /// are reported, not errors.
    pub fn check_status(&self, paths: &[String]) -> Result<Vec<DocStatus>> {
        let now = Utc::now();
        let mut out = Vec::with_capacity(paths.len());

        for raw in paths {
            let path = Path::new(raw);
            if !path.exists() {
                out.push(DocStatus {
                    path: raw.clone(),
                    exists: false,
                    word_count: 0,
                    age_days: None,
                    stale: true,
                });
                continue;
            }

            let content = std::fs::read_to_string(path).unwrap_or_default();
            let meta = with_db(&self.db, |db| db.document(raw))?;
            let age_days = meta
                .as_ref()
                .map(|m| (now - m.updated_at).num_days())
                .or_else(|| {
                    path.metadata()
                        .and_then(|m| m.modified())
                        .ok()
                        .map(|mtime| {
                            let mtime: chrono::DateTime<Utc> = mtime.into();
                            (now - mtime).num_days()
                        })
                });

            out.push(DocStatus {
                path: raw.clone(),
                exists: true,
                word_count: word_count(&content),
                stale: age_days.map(|d| d > 7).unwrap_or(false),
                age_days,
            });
        }

        Ok(out)
    }

    fn record(
        &self,
        path: &Path,
        session_id: &str,
        kind: DocumentKind,
        content: &str,
    ) -> Result<GeneratedDocument> {
        let now = Utc::now();
        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
        let sections = extract_sections(content);
        let words = word_count(content);

        let meta = DocumentMeta {
            path: absolute.clone(),
            session_id: session_id.to_string(),
            kind,
            generated_at: now,
            word_count: words,
            sections: sections.clone(),
            references: Vec::new(),
            updated_at: now,
        };
        with_db(&self.db, |db| db.upsert_document(&meta))?;

        self.observables.publish(
            topics::DOCUMENTATION_STATUS,
            json!({
                "path": absolute,
                "kind": kind,
                "word_count": words,
                "session_id": session_id,
                "updated_at": now.to_rfc3339(),
            }),
        );

        Ok(GeneratedDocument {
            path: absolute,
            kind,
            word_count: words,
            sections,
        })
    }
}

fn filter_sections(content: &str, only: &[String]) -> String {
    let mut out = Vec::new();
    let mut keep = true;

    for line in content.lines() {
        if let Some(heading) = line.trim_start().strip_prefix("## ") {
            keep = only.iter().any(|s| s.eq_ignore_ascii_case(heading.trim()));
        }
        if keep || line.starts_with("# ") {
            out.push(line);
        }
    }

    out.join("\n")
}

/// Group stray content under canonical headings, preserving order of first
/// appearance.
fn restructure(content: &str) -> String {
    let mut title = None;
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    let mut preamble: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("# ") && title.is_none() {
            title = Some(line.to_string());
        } else if let Some(heading) = trimmed.strip_prefix("## ") {
            sections.push((heading.trim().to_string(), Vec::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push(line.to_string());
        } else if !trimmed.is_empty() {
            preamble.push(line.to_string());
        }
    }

    let mut out = String::new();
    if let Some(t) = title {
        out.push_str(&t);
        out.push_str("\n\n");
    }
    if !preamble.is_empty() {
        out.push_str(&preamble.join("\n"));
        out.push_str("\n\n");
    }
    for (heading, body) in sections {
        out.push_str(&format!("## {}\n", heading));
        let trimmed: Vec<_> = body
            .iter()
            .skip_while(|l| l.trim().is_empty())
            .cloned()
            .collect();
        if !trimmed.is_empty() {
            out.push('\n');
            out.push_str(trimmed.join("\n").trim_end());
            out.push('\n');
        }
        out.push('\n');
    }

    out.trim_end().to_string() + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_store::Database;
    use std::sync::{Arc, Mutex};

    fn engine_with_session() -> (DocumentationEngine, tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();

        let scope = cadence_types::SessionScope {
            lines: 100,
            tests: 10,
            docs: 5,
        };
        let plan = cadence_types::BudgetPlan::derive(&scope);
        let now = Utc::now();
        let session = cadence_types::Session {
            id: "sess-doc".into(),
            project: "demo".into(),
            kind: cadence_types::SessionKind::Feature,
            start_time: now,
            estimated_end: None,
            end_time: None,
            phase: cadence_types::SessionPhase::Planning,
            status: cadence_types::SessionStatus::Active,
            scope,
            context_budget: plan.context_budget,
            context_used: 0,
            metrics: cadence_types::SessionMetrics::default(),
        };
        let cp0 = cadence_types::Checkpoint {
            id: "cp-0".into(),
            session_id: session.id.clone(),
            number: 0,
            timestamp: now,
            context_used: 0,
            commit_hash: None,
            completed_components: Vec::new(),
            metrics: cadence_types::SessionMetrics::default(),
            continuation: cadence_types::ContinuationPlan::default(),
        };
        db.create_session(&session, &cp0).unwrap();

        let engine = DocumentationEngine::new(
            Arc::new(Mutex::new(db)),
            ObservableRegistry::new(),
            dir.path().join("docs"),
        );
        (engine, dir, "sess-doc".into())
    }

    #[test]
    fn generate_writes_file_and_counts_words() {
        let (engine, _dir, session_id) = engine_with_session();
        let doc = engine
            .generate(&session_id, DocumentKind::Handoff, None, HashMap::new())
            .unwrap();

        assert!(Path::new(&doc.path).exists());
        assert!(doc.word_count > 0);
        assert!(doc.sections.iter().any(|s| s == "Completed"));
    }

    #[test]
    fn generate_for_missing_session_is_not_found() {
        let (engine, _dir, _) = engine_with_session();
        let err = engine
            .generate("nope", DocumentKind::Readme, None, HashMap::new())
            .unwrap_err();
        assert_eq!(err.code(), "session_not_found");
    }

    #[test]
    fn append_update_keeps_existing_content() {
        let (engine, _dir, session_id) = engine_with_session();
        let doc = engine
            .generate(&session_id, DocumentKind::Readme, None, HashMap::new())
            .unwrap();

        let updated = engine
            .update(&doc.path, DocumentUpdateMode::Append, Some("New note"))
            .unwrap();
        let content = std::fs::read_to_string(&updated.path).unwrap();
        assert!(content.contains("New note"));
        assert!(updated.word_count > doc.word_count);
    }

    #[test]
    fn update_missing_document_is_not_found() {
        let (engine, _dir, _) = engine_with_session();
        let err = engine
            .update("/no/such/file.md", DocumentUpdateMode::Append, None)
            .unwrap_err();
        assert_eq!(err.code(), "document_not_found");
    }

    #[test]
    fn check_status_reports_missing_paths() {
        let (engine, _dir, _) = engine_with_session();
        let statuses = engine
            .check_status(&["/no/such/file.md".to_string()])
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(!statuses[0].exists);
        assert!(statuses[0].stale);
    }

    #[test]
    fn restructure_groups_content_under_headings() {
        let raw = "# T\nintro\n## A\n\nbody a\n## B\nbody b\n";
        let out = restructure(raw);
        assert!(out.contains("## A\n\nbody a"));
        assert!(out.contains("## B\n\nbody b"));
    }
}
