//! TestWorld pattern for declarative test setup: an isolated data
//! directory, a seeded store, and the observable registry under one roof.

use std::sync::{Arc, Mutex};

use cadence_core::{ObservableRegistry, SharedDb};
use cadence_store::Database;
use cadence_types::Session;
use tempfile::TempDir;

use crate::fixtures;

pub struct TestWorld {
    /// Kept alive for the lifetime of the world; dropping removes the tree
    pub dir: TempDir,
    pub db: SharedDb,
    pub observables: ObservableRegistry,
}

impl TestWorld {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create test dir");
        let db: SharedDb = Arc::new(Mutex::new(
            Database::open_in_memory().expect("open in-memory store"),
        ));
        Self {
            dir,
            db,
            observables: ObservableRegistry::new(),
        }
    }

    /// Seed an active session with its synthesized checkpoint 0.
    pub fn with_session(self, id: &str, project: &str) -> Self {
        let session = fixtures::session(id, project);
        self.insert_session(&session);
        self
    }

    pub fn insert_session(&self, session: &Session) {
        let cp0 = fixtures::checkpoint_zero(session);
        self.db
            .lock()
            .expect("store lock")
            .create_session(session, &cp0)
            .expect("seed session");
    }

    /// Append usage samples, advancing the session total as production
    /// writes do.
    pub fn with_usage(self, session_id: &str, tokens: &[u64]) -> Self {
        {
            let mut db = self.db.lock().expect("store lock");
            for (i, t) in tokens.iter().enumerate() {
                let sample = fixtures::sample(session_id, *t, tokens.len() as i64 - i as i64);
                db.track_usage(&sample).expect("seed usage");
            }
        }
        self
    }

    pub fn workspace_path(&self) -> std::path::PathBuf {
        self.dir.path().to_path_buf()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
