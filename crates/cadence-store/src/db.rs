use anyhow::Context;
use cadence_types::{
    AgentDecision, Blocker, Checkpoint, ContextSample, DocumentMeta, Project, QuickAction,
    RealitySnapshot, Session, SessionMetrics, SessionPhase, SessionStatus, Symbol,
    SymbolContextType,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

use crate::queries;
use crate::schema;
use crate::{Error, Result};

/// Outcome of a symbol registration attempt
#[derive(Debug, Clone)]
pub enum SymbolRegistration {
    /// No prior binding existed; the symbol was recorded
    Created(Symbol),
    /// (project, concept, context_type) already bound to another name
    Conflict(Symbol),
}

/// Owns the SQLite connection. One writer at a time: callers wrap the
/// database in a mutex and every multi-row operation here runs in a single
/// transaction.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL").ok();
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init_schema(&self.conn).context("Failed to run schema migrations")?;
        Ok(())
    }

    /// Cheap liveness probe for the health endpoint
    pub fn probe(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // --- sessions ---

    /// Insert session + synthesized checkpoint 0, ensuring the project row,
    /// in one transaction.
    pub fn create_session(&mut self, session: &Session, checkpoint_zero: &Checkpoint) -> Result<()> {
        let tx = self.conn.transaction()?;
        queries::projects::ensure(&tx, &session.project, &session.start_time)?;
        queries::sessions::insert(&tx, session)?;
        queries::checkpoints::insert(&tx, checkpoint_zero)?;
        tx.commit()?;
        Ok(())
    }

    pub fn session(&self, id: &str) -> Result<Option<Session>> {
        queries::sessions::get_by_id(&self.conn, id)
    }

    pub fn latest_active_session(&self, project: Option<&str>) -> Result<Option<Session>> {
        queries::sessions::latest_active(&self.conn, project)
    }

    pub fn list_sessions(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        queries::sessions::list(&self.conn, project, limit)
    }

    pub fn sessions_since(
        &self,
        project: &str,
        since: Option<&DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Session>> {
        let since = since.map(|ts| ts.to_rfc3339());
        queries::sessions::list_in_range(&self.conn, project, since.as_deref(), limit)
    }

    pub fn set_session_status(
        &mut self,
        session_id: &str,
        status: SessionStatus,
        end_time: Option<&DateTime<Utc>>,
    ) -> Result<()> {
        queries::sessions::update_status(&self.conn, session_id, status, end_time)
    }

    /// Append a usage sample and advance the session's running total in one
    /// transaction. The samples ledger stays append-only.
    pub fn track_usage(&mut self, sample: &ContextSample) -> Result<Session> {
        let tx = self.conn.transaction()?;
        let session = queries::sessions::get_by_id(&tx, &sample.session_id)?
            .ok_or_else(|| Error::Corrupt(format!("session vanished: {}", sample.session_id)))?;

        queries::samples::insert(&tx, sample)?;
        let new_used = session.context_used + sample.tokens;
        queries::sessions::update_usage(&tx, &sample.session_id, new_used, sample.phase)?;
        tx.commit()?;

        let mut updated = session;
        updated.context_used = new_used;
        updated.phase = sample.phase;
        Ok(updated)
    }

    /// Write a checkpoint, its delta sample (when positive), the session's
    /// new usage/phase, and refreshed metrics atomically. The transient
    /// `checkpoint` status never escapes the transaction; the session
    /// returns to `active`.
    pub fn record_checkpoint(
        &mut self,
        checkpoint: &Checkpoint,
        delta_sample: Option<&ContextSample>,
        phase: SessionPhase,
        metrics: &SessionMetrics,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        queries::sessions::update_status(&tx, &checkpoint.session_id, SessionStatus::Checkpoint, None)?;
        queries::checkpoints::insert(&tx, checkpoint)?;
        if let Some(sample) = delta_sample {
            queries::samples::insert(&tx, sample)?;
        }
        queries::sessions::update_usage(&tx, &checkpoint.session_id, checkpoint.context_used, phase)?;
        queries::sessions::update_metrics(&tx, &checkpoint.session_id, metrics)?;
        queries::sessions::update_status(&tx, &checkpoint.session_id, SessionStatus::Active, None)?;
        tx.commit()?;
        Ok(())
    }

    /// Terminal transition plus project aggregate fold, one transaction.
    pub fn finish_session(
        &mut self,
        session_id: &str,
        status: SessionStatus,
        end_time: &DateTime<Utc>,
        project: &Project,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        queries::sessions::update_status(&tx, session_id, status, Some(end_time))?;
        queries::projects::update_aggregates(&tx, project)?;
        tx.commit()?;
        Ok(())
    }

    // --- checkpoints ---

    pub fn checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        queries::checkpoints::list_for_session(&self.conn, session_id)
    }

    pub fn latest_checkpoint(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        queries::checkpoints::latest_for_session(&self.conn, session_id)
    }

    pub fn next_checkpoint_number(&self, session_id: &str) -> Result<u32> {
        queries::checkpoints::next_number(&self.conn, session_id)
    }

    // --- context samples ---

    pub fn samples(&self, session_id: &str) -> Result<Vec<ContextSample>> {
        queries::samples::list_for_session(&self.conn, session_id)
    }

    pub fn total_sample_tokens(&self, session_id: &str) -> Result<u64> {
        queries::samples::total_tokens(&self.conn, session_id)
    }

    // --- reality snapshots ---

    pub fn insert_snapshot(&mut self, snapshot: &RealitySnapshot) -> Result<()> {
        queries::snapshots::insert(&self.conn, snapshot)
    }

    pub fn snapshot(&self, id: &str) -> Result<Option<RealitySnapshot>> {
        queries::snapshots::get_by_id(&self.conn, id)
    }

    pub fn snapshots_for_session(&self, session_id: &str) -> Result<Vec<RealitySnapshot>> {
        queries::snapshots::list_for_session(&self.conn, session_id)
    }

    // --- projects ---

    pub fn project(&self, name: &str) -> Result<Option<Project>> {
        queries::projects::get(&self.conn, name)
    }

    pub fn ensure_project(&mut self, name: &str, now: &DateTime<Utc>) -> Result<()> {
        queries::projects::ensure(&self.conn, name, now)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        queries::projects::list(&self.conn)
    }

    pub fn update_project(&mut self, project: &Project) -> Result<()> {
        queries::projects::update_aggregates(&self.conn, project)
    }

    // --- blockers ---

    pub fn insert_blocker(&mut self, blocker: &Blocker) -> Result<()> {
        queries::blockers::insert(&self.conn, blocker)
    }

    pub fn blocker(&self, id: &str) -> Result<Option<Blocker>> {
        queries::blockers::get_by_id(&self.conn, id)
    }

    pub fn resolve_blocker(
        &mut self,
        id: &str,
        resolution: &str,
        resolved_at: &DateTime<Utc>,
        time_to_resolve_minutes: i64,
    ) -> Result<()> {
        queries::blockers::resolve(&self.conn, id, resolution, resolved_at, time_to_resolve_minutes)
    }

    pub fn blockers_for_project(&self, project: &str) -> Result<Vec<Blocker>> {
        queries::blockers::list_for_project(&self.conn, project)
    }

    // --- symbols ---

    /// Register under the (project, concept, context_type) uniqueness rule.
    /// An existing binding with a different chosen name is a conflict and is
    /// returned untouched.
    pub fn register_symbol(&mut self, symbol: &Symbol) -> Result<SymbolRegistration> {
        let tx = self.conn.transaction()?;
        let existing =
            queries::symbols::find(&tx, &symbol.project, &symbol.concept, symbol.context_type)?;

        let outcome = match existing {
            Some(current) if current.chosen_name == symbol.chosen_name => {
                queries::symbols::increment_usage(&tx, &current.id)?;
                let mut refreshed = current;
                refreshed.usage_count += 1;
                SymbolRegistration::Created(refreshed)
            }
            Some(current) => SymbolRegistration::Conflict(current),
            None => {
                queries::symbols::insert(&tx, symbol)?;
                SymbolRegistration::Created(symbol.clone())
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Lookup increments usage_count by one when the symbol exists.
    pub fn lookup_symbol(
        &mut self,
        project: &str,
        concept: &str,
        context_type: SymbolContextType,
    ) -> Result<Option<Symbol>> {
        let tx = self.conn.transaction()?;
        let found = queries::symbols::find(&tx, project, concept, context_type)?;
        let result = match found {
            Some(symbol) => {
                queries::symbols::increment_usage(&tx, &symbol.id)?;
                let mut refreshed = symbol;
                refreshed.usage_count += 1;
                Some(refreshed)
            }
            None => None,
        };
        tx.commit()?;
        Ok(result)
    }

    pub fn peek_symbol(
        &self,
        project: &str,
        concept: &str,
        context_type: SymbolContextType,
    ) -> Result<Option<Symbol>> {
        queries::symbols::find(&self.conn, project, concept, context_type)
    }

    pub fn symbols_for_project(&self, project: &str) -> Result<Vec<Symbol>> {
        queries::symbols::list_for_project(&self.conn, project)
    }

    // --- agent decisions ---

    pub fn record_decision(&mut self, decision: &AgentDecision) -> Result<()> {
        queries::decisions::insert(&self.conn, decision)
    }

    pub fn query_decisions(
        &self,
        agent_name: Option<&str>,
        action_type: Option<&str>,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentDecision>> {
        queries::decisions::query(&self.conn, agent_name, action_type, project, limit)
    }

    // --- quick actions ---

    pub fn insert_quick_action(&mut self, action: &QuickAction) -> Result<()> {
        queries::actions::insert(&self.conn, action)
    }

    pub fn quick_action(&self, id: &str) -> Result<Option<QuickAction>> {
        queries::actions::get_by_id(&self.conn, id)
    }

    pub fn list_quick_actions(&self) -> Result<Vec<QuickAction>> {
        queries::actions::list(&self.conn)
    }

    pub fn record_action_use(&mut self, id: &str, used_at: &DateTime<Utc>) -> Result<()> {
        queries::actions::record_use(&self.conn, id, used_at)
    }

    // --- documents ---

    pub fn upsert_document(&mut self, meta: &DocumentMeta) -> Result<()> {
        queries::documents::upsert(&self.conn, meta)
    }

    pub fn document(&self, path: &str) -> Result<Option<DocumentMeta>> {
        queries::documents::get_by_path(&self.conn, path)
    }

    pub fn documents_for_session(&self, session_id: &str) -> Result<Vec<DocumentMeta>> {
        queries::documents::list_for_session(&self.conn, session_id)
    }

    pub fn document_count_for_session(&self, session_id: &str) -> Result<usize> {
        queries::documents::count_for_session(&self.conn, session_id)
    }

    // --- ui state ---

    pub fn put_ui_state(
        &mut self,
        key: &str,
        value: &serde_json::Value,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        queries::ui_state::put(&self.conn, key, value, now)
    }

    pub fn ui_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        queries::ui_state::get(&self.conn, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::{BudgetPlan, ContinuationPlan, SessionKind, SessionScope};

    fn sample_session(id: &str, project: &str) -> (Session, Checkpoint) {
        let scope = SessionScope {
            lines: 1000,
            tests: 500,
            docs: 200,
        };
        let plan = BudgetPlan::derive(&scope);
        let now = Utc::now();

        let session = Session {
            id: id.to_string(),
            project: project.to_string(),
            kind: SessionKind::Feature,
            start_time: now,
            estimated_end: None,
            end_time: None,
            phase: SessionPhase::Planning,
            status: SessionStatus::Active,
            scope,
            context_budget: plan.context_budget,
            context_used: 0,
            metrics: SessionMetrics::default(),
        };

        let checkpoint_zero = Checkpoint {
            id: format!("{}-cp0", id),
            session_id: id.to_string(),
            number: 0,
            timestamp: now,
            context_used: 0,
            commit_hash: None,
            completed_components: Vec::new(),
            metrics: SessionMetrics::default(),
            continuation: ContinuationPlan::default(),
        };

        (session, checkpoint_zero)
    }

    #[test]
    fn create_session_seeds_project_and_checkpoint_zero() {
        let mut db = Database::open_in_memory().unwrap();
        let (session, cp0) = sample_session("s-1", "demo");

        db.create_session(&session, &cp0).unwrap();

        assert!(db.project("demo").unwrap().is_some());
        let checkpoints = db.checkpoints("s-1").unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].number, 0);
        assert_eq!(db.next_checkpoint_number("s-1").unwrap(), 1);
    }

    #[test]
    fn track_usage_keeps_session_total_in_sync_with_ledger() {
        let mut db = Database::open_in_memory().unwrap();
        let (session, cp0) = sample_session("s-2", "demo");
        db.create_session(&session, &cp0).unwrap();

        for tokens in [2000u64, 1500, 500] {
            let sample = ContextSample {
                session_id: "s-2".into(),
                timestamp: Utc::now(),
                phase: SessionPhase::Planning,
                tokens,
                label: "work".into(),
            };
            db.track_usage(&sample).unwrap();
        }

        let session = db.session("s-2").unwrap().unwrap();
        assert_eq!(session.context_used, 4000);
        assert_eq!(db.total_sample_tokens("s-2").unwrap(), 4000);
    }

    #[test]
    fn latest_active_prefers_newest_start_time() {
        let mut db = Database::open_in_memory().unwrap();
        let (mut older, cp_a) = sample_session("s-old", "demo");
        older.start_time = Utc::now() - chrono::Duration::hours(2);
        db.create_session(&older, &cp_a).unwrap();

        let (newer, cp_b) = sample_session("s-new", "demo");
        db.create_session(&newer, &cp_b).unwrap();

        let active = db.latest_active_session(Some("demo")).unwrap().unwrap();
        assert_eq!(active.id, "s-new");
    }

    #[test]
    fn symbol_register_then_lookup_increments_usage() {
        let mut db = Database::open_in_memory().unwrap();
        let symbol = Symbol {
            id: "sym-1".into(),
            project: "demo".into(),
            concept: "user record cache".into(),
            chosen_name: "UserCache".into(),
            context_type: SymbolContextType::Class,
            confidence: 0.9,
            usage_count: 1,
            created_by_agent: "symbol_contractor".into(),
            session_id: None,
            created_at: Utc::now(),
        };

        match db.register_symbol(&symbol).unwrap() {
            SymbolRegistration::Created(s) => assert_eq!(s.usage_count, 1),
            SymbolRegistration::Conflict(_) => panic!("expected creation"),
        }

        let found = db
            .lookup_symbol("demo", "user record cache", SymbolContextType::Class)
            .unwrap()
            .unwrap();
        assert_eq!(found.chosen_name, "UserCache");
        assert_eq!(found.usage_count, 2);
    }

    #[test]
    fn symbol_conflict_preserves_existing_binding() {
        let mut db = Database::open_in_memory().unwrap();
        let mut symbol = Symbol {
            id: "sym-1".into(),
            project: "demo".into(),
            concept: "user record cache".into(),
            chosen_name: "UserCache".into(),
            context_type: SymbolContextType::Class,
            confidence: 0.9,
            usage_count: 1,
            created_by_agent: "symbol_contractor".into(),
            session_id: None,
            created_at: Utc::now(),
        };
        db.register_symbol(&symbol).unwrap();

        symbol.id = "sym-2".into();
        symbol.chosen_name = "RecordCache".into();
        match db.register_symbol(&symbol).unwrap() {
            SymbolRegistration::Conflict(existing) => {
                assert_eq!(existing.chosen_name, "UserCache")
            }
            SymbolRegistration::Created(_) => panic!("expected conflict"),
        }
    }

    #[test]
    fn decisions_survive_without_session_row() {
        let mut db = Database::open_in_memory().unwrap();
        let decision = AgentDecision {
            agent_name: "context_guardian".into(),
            action_type: "optimization".into(),
            input_context: "usage at 81%".into(),
            decision_made: "suggest summarize".into(),
            outcome: None,
            project: "demo".into(),
            session_id: Some("never-created".into()),
            timestamp: Utc::now(),
        };

        db.record_decision(&decision).unwrap();

        let found = db
            .query_decisions(Some("context_guardian"), None, Some("demo"), 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].decision_made, "suggest summarize");
    }
}
