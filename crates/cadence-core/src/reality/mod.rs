mod scan;

use std::path::PathBuf;

use cadence_types::{
    CheckKind, Discrepancy, DiscrepancyKind, Error, MetricValidation, RealitySnapshot, Result,
    Severity,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::context::require_session;
use crate::ids::new_id;
use crate::observable::{ObservableRegistry, topics};
use crate::testcmd::TestCommand;
use crate::vcs::Vcs;
use crate::{SharedDb, with_db};

const UNCOMMITTED_DRIFT_THRESHOLD: usize = 5;
const TEST_COUNT_TOLERANCE: i64 = 5;

/// What a reality check hands back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct RealityReport {
    pub snapshot_id: String,
    pub timestamp: String,
    pub discrepancies: Vec<Discrepancy>,
    pub confidence_score: u8,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixFailure {
    pub id: String,
    pub error: String,
}

/// Partial success is the normal shape here: per-item failures, never the
/// error channel.
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub applied: Vec<String>,
    pub failed: Vec<FixFailure>,
    pub commit_hash: Option<String>,
}

/// Reported metric values under validation; absent fields are skipped
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ReportedMetrics {
    pub lines_written: Option<f64>,
    pub tests_written: Option<f64>,
    pub tests_passing: Option<f64>,
    pub docs_updated: Option<f64>,
}

/// Compares claimed progress against the filesystem, the test process, and
/// the documentation tree.
pub struct RealityChecker {
    db: SharedDb,
    observables: ObservableRegistry,
    workspace_root: PathBuf,
}

impl RealityChecker {
    pub fn new(
        db: SharedDb,
        observables: ObservableRegistry,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            observables,
            workspace_root: workspace_root.into(),
        }
    }

    /// Run the checks selected by `kind`, store an immutable snapshot, and
    /// broadcast the result.
    pub async fn perform_check(
        &self,
        session_id: &str,
        kind: CheckKind,
        focus_areas: &[String],
    ) -> Result<RealityReport> {
        let session = require_session(&self.db, session_id)?;

        let areas: Vec<String> = match kind {
            CheckKind::Quick => vec!["filesystem".into()],
            CheckKind::Comprehensive => vec![
                "filesystem".into(),
                "vcs".into(),
                "tests".into(),
                "documentation".into(),
            ],
            CheckKind::Specific => {
                if focus_areas.is_empty() {
                    return Err(Error::invalid_parameters(
                        vec!["focus_areas".into()],
                        "specific checks need at least one focus area",
                    ));
                }
                focus_areas.to_vec()
            }
        };

        let mut discrepancies = Vec::new();

        if areas.iter().any(|a| a == "filesystem") {
            self.check_filesystem(session_id, &mut discrepancies)?;
        }
        if areas.iter().any(|a| a == "vcs") {
            self.check_working_copy(&mut discrepancies).await;
        }
        if areas.iter().any(|a| a == "tests") {
            self.check_tests(session.metrics.tests_passing, &mut discrepancies)
                .await?;
        }
        if areas.iter().any(|a| a == "documentation") {
            self.check_documentation(session_id, &mut discrepancies)?;
        }

        // Ids are assigned after all checks so they stay dense per snapshot.
        for (index, d) in discrepancies.iter_mut().enumerate() {
            d.id = format!("disc-{}", index);
        }

        let confidence = RealitySnapshot::confidence_for(&discrepancies);
        let snapshot = RealitySnapshot {
            id: new_id("snap"),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            discrepancies: discrepancies.clone(),
            confidence,
        };
        with_db(&self.db, |db| db.insert_snapshot(&snapshot))?;

        let critical = discrepancies
            .iter()
            .filter(|d| d.severity == Severity::Critical)
            .count();
        let warnings = discrepancies
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();

        let mut recommendations = Vec::new();
        if critical > 0 {
            recommendations.push(format!(
                "Address {} critical issues before continuing",
                critical
            ));
        }
        if warnings > 0 {
            recommendations.push(format!("Review {} warnings", warnings));
        }
        if discrepancies.is_empty() {
            recommendations.push("Reality matches claimed progress".to_string());
        }

        self.observables.publish(
            topics::REALITY_CHECKS,
            json!({
                "snapshot_id": snapshot.id,
                "session_id": session_id,
                "confidence": confidence,
                "critical": critical,
                "warnings": warnings,
                "total": discrepancies.len(),
            }),
        );
        info!(
            session = session_id,
            confidence, critical, "reality check complete"
        );

        Ok(RealityReport {
            snapshot_id: snapshot.id,
            timestamp: snapshot.timestamp.to_rfc3339(),
            discrepancies,
            confidence_score: confidence,
            recommendations,
        })
    }

    /// Claimed-path existence scan over every checkpoint's completed
    /// components.
    fn check_filesystem(&self, session_id: &str, out: &mut Vec<Discrepancy>) -> Result<()> {
        let checkpoints = with_db(&self.db, |db| db.checkpoints(session_id))?;

        let mut claimed = std::collections::BTreeSet::new();
        for checkpoint in &checkpoints {
            for component in &checkpoint.completed_components {
                for path in scan::extract_paths(component) {
                    claimed.insert(path);
                }
            }
        }

        for path in claimed {
            let candidate = self.workspace_root.join(&path);
            if !candidate.exists() && !PathBuf::from(&path).exists() {
                out.push(Discrepancy {
                    id: String::new(),
                    kind: DiscrepancyKind::FileMismatch,
                    severity: Severity::Critical,
                    description: format!("claimed file does not exist: {}", path),
                    location: Some(path.clone()),
                    suggested_fix: Some(format!("restore or implement {}", path)),
                    auto_fixable: false,
                    priority: 90,
                });
            }
        }

        Ok(())
    }

    /// Advisory working-copy drift; silently skipped without a repository.
    async fn check_working_copy(&self, out: &mut Vec<Discrepancy>) {
        let vcs = Vcs::new(&self.workspace_root);
        match vcs.uncommitted_files().await {
            Ok(Some(files)) if files.len() > UNCOMMITTED_DRIFT_THRESHOLD => {
                out.push(Discrepancy {
                    id: String::new(),
                    kind: DiscrepancyKind::StateDrift,
                    severity: Severity::Warning,
                    description: format!("{} uncommitted files in the working copy", files.len()),
                    location: None,
                    suggested_fix: Some("commit or stash in-progress work".into()),
                    auto_fixable: false,
                    priority: 50,
                });
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "working-copy check skipped"),
        }
    }

    async fn check_tests(&self, claimed_passing: i64, out: &mut Vec<Discrepancy>) -> Result<()> {
        let Some(command) = TestCommand::discover(&self.workspace_root) else {
            return Ok(());
        };

        let outcome = command.run(&self.workspace_root).await?;

        if let Some(failing) = outcome.failing
            && failing > 0
        {
            out.push(Discrepancy {
                id: String::new(),
                kind: DiscrepancyKind::TestFailure,
                severity: Severity::Critical,
                description: format!("{} tests failing", failing),
                location: None,
                suggested_fix: Some("fix failing tests before the next checkpoint".into()),
                auto_fixable: false,
                priority: 95,
            });
        }

        if let Some(passing) = outcome.passing {
            let diff = (claimed_passing - passing as i64).abs();
            if claimed_passing > 0 && diff > TEST_COUNT_TOLERANCE {
                out.push(Discrepancy {
                    id: String::new(),
                    kind: DiscrepancyKind::TestFailure,
                    severity: Severity::Warning,
                    description: format!(
                        "claimed {} passing tests but observed {}",
                        claimed_passing, passing
                    ),
                    location: None,
                    suggested_fix: Some("re-run tests and update session metrics".into()),
                    auto_fixable: false,
                    priority: 55,
                });
            }
        }

        Ok(())
    }

    fn check_documentation(&self, session_id: &str, out: &mut Vec<Discrepancy>) -> Result<()> {
        if !self.workspace_root.join("README.md").exists() {
            out.push(Discrepancy {
                id: String::new(),
                kind: DiscrepancyKind::DocumentationGap,
                severity: Severity::Warning,
                description: "project has no README.md".into(),
                location: Some("README.md".into()),
                suggested_fix: Some("generate a README stub".into()),
                auto_fixable: true,
                priority: 40,
            });
        }

        let session = require_session(&self.db, session_id)?;
        let checkpoints = with_db(&self.db, |db| db.checkpoints(session_id))?;
        let feature_components = checkpoints
            .iter()
            .flat_map(|c| c.completed_components.iter())
            .filter(|c| {
                let lower = c.to_lowercase();
                ["add", "implement", "feature", "create"]
                    .iter()
                    .any(|kw| lower.contains(kw))
            })
            .count();

        let docs_written = with_db(&self.db, |db| db.document_count_for_session(session_id))?;
        if feature_components >= 3 && docs_written == 0 && session.metrics.docs_updated == 0 {
            out.push(Discrepancy {
                id: String::new(),
                kind: DiscrepancyKind::DocumentationGap,
                severity: Severity::Info,
                description: format!(
                    "{} feature components completed with no documentation updates",
                    feature_components
                ),
                location: None,
                suggested_fix: Some("generate or update docs for the new features".into()),
                auto_fixable: false,
                priority: 20,
            });
        }

        Ok(())
    }

    /// Compare reported metric values against observed heuristics.
    pub fn validate_metrics(
        &self,
        session_id: &str,
        reported: &ReportedMetrics,
    ) -> Result<Vec<MetricValidation>> {
        let session = require_session(&self.db, session_id)?;
        let mut out = Vec::new();

        if let Some(lines) = reported.lines_written {
            let actual =
                scan::count_lines_modified_since(&self.workspace_root, &session.start_time);
            out.push(MetricValidation::compare("lines_written", lines, actual as f64));
        }
        if let Some(tests) = reported.tests_written {
            let actual = scan::estimate_test_count(&self.workspace_root);
            out.push(MetricValidation::compare("tests_written", tests, actual as f64));
        }
        if let Some(passing) = reported.tests_passing {
            let actual = scan::estimate_test_count(&self.workspace_root);
            out.push(MetricValidation::compare("tests_passing", passing, actual as f64));
        }
        if let Some(docs) = reported.docs_updated {
            let actual = with_db(&self.db, |db| db.document_count_for_session(session_id))?;
            out.push(MetricValidation::compare("docs_updated", docs, actual as f64));
        }

        Ok(out)
    }

    /// Apply selected auto-fixable discrepancies from a stored snapshot.
    /// Unknown and non-fixable ids become per-item failures; the batch never
    /// aborts.
    pub async fn apply_fixes(
        &self,
        snapshot_id: &str,
        fix_ids: &[String],
        auto_commit: bool,
    ) -> Result<FixOutcome> {
        let snapshot = with_db(&self.db, |db| db.snapshot(snapshot_id))?.ok_or_else(|| {
            Error::invalid_parameters(
                vec!["snapshot_id".into()],
                format!("unknown snapshot: {}", snapshot_id),
            )
        })?;

        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for id in fix_ids {
            let Some(discrepancy) = snapshot.discrepancies.iter().find(|d| &d.id == id) else {
                failed.push(FixFailure {
                    id: id.clone(),
                    error: "unknown fix id".into(),
                });
                continue;
            };
            if !discrepancy.auto_fixable {
                failed.push(FixFailure {
                    id: id.clone(),
                    error: "discrepancy is not auto-fixable".into(),
                });
                continue;
            }

            match self.apply_one(discrepancy) {
                Ok(()) => applied.push(id.clone()),
                Err(err) => failed.push(FixFailure {
                    id: id.clone(),
                    error: err.to_string(),
                }),
            }
        }

        let commit_hash = if auto_commit && !applied.is_empty() {
            let vcs = Vcs::new(&self.workspace_root);
            match vcs.commit_all("apply reality-check fixes").await {
                Ok(hash) => Some(hash),
                Err(err) => {
                    warn!(error = %err, "auto-commit of fixes failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(FixOutcome {
            applied,
            failed,
            commit_hash,
        })
    }

    fn apply_one(&self, discrepancy: &Discrepancy) -> Result<()> {
        match discrepancy.kind {
            DiscrepancyKind::DocumentationGap => {
                let path = self.workspace_root.join(
                    discrepancy
                        .location
                        .as_deref()
                        .unwrap_or("README.md"),
                );
                let project = self
                    .workspace_root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("project");
                let stub = format!(
                    "# {}\n\nGenerated stub. Replace with a real overview.\n",
                    project
                );
                std::fs::write(&path, stub)
                    .map_err(|e| Error::Storage(format!("cannot write README stub: {}", e)))?;
                Ok(())
            }
            _ => Err(Error::InvalidState(format!(
                "no automatic fix for {:?}",
                discrepancy.kind
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_store::Database;
    use cadence_types::{
        BudgetPlan, Checkpoint, ContinuationPlan, Session, SessionKind, SessionMetrics,
        SessionPhase, SessionScope, SessionStatus,
    };
    use std::sync::{Arc, Mutex};

    fn checker_with_session(
        claimed_components: Vec<String>,
    ) -> (RealityChecker, tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open_in_memory().unwrap();

        let scope = SessionScope {
            lines: 100,
            tests: 10,
            docs: 2,
        };
        let now = Utc::now();
        let session = Session {
            id: "sess-real".into(),
            project: "demo".into(),
            kind: SessionKind::Feature,
            start_time: now,
            estimated_end: None,
            end_time: None,
            phase: SessionPhase::Implementation,
            status: SessionStatus::Active,
            scope,
            context_budget: BudgetPlan::derive(&scope).context_budget,
            context_used: 0,
            metrics: SessionMetrics::default(),
        };
        let cp0 = Checkpoint {
            id: "cp-0".into(),
            session_id: session.id.clone(),
            number: 0,
            timestamp: now,
            context_used: 0,
            commit_hash: None,
            completed_components: claimed_components,
            metrics: SessionMetrics::default(),
            continuation: ContinuationPlan::default(),
        };
        db.create_session(&session, &cp0).unwrap();

        let checker = RealityChecker::new(
            Arc::new(Mutex::new(db)),
            ObservableRegistry::new(),
            dir.path(),
        );
        (checker, dir, "sess-real".into())
    }

    #[tokio::test]
    async fn quick_check_flags_missing_claimed_file() {
        let (checker, _dir, session_id) =
            checker_with_session(vec!["src/managers/session_manager.ts".into()]);

        let report = checker
            .perform_check(&session_id, CheckKind::Quick, &[])
            .await
            .unwrap();

        assert_eq!(report.discrepancies.len(), 1);
        let d = &report.discrepancies[0];
        assert_eq!(d.kind, DiscrepancyKind::FileMismatch);
        assert_eq!(d.severity, Severity::Critical);
        assert_eq!(report.confidence_score, 80);
        assert!(
            report
                .recommendations
                .contains(&"Address 1 critical issues before continuing".to_string())
        );
    }

    #[tokio::test]
    async fn quick_check_passes_when_claimed_file_exists() {
        let (checker, dir, session_id) = checker_with_session(vec!["src/lib.rs".into()]);
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}\n").unwrap();

        let report = checker
            .perform_check(&session_id, CheckKind::Quick, &[])
            .await
            .unwrap();

        assert!(report.discrepancies.is_empty());
        assert_eq!(report.confidence_score, 100);
        assert!(
            report
                .recommendations
                .contains(&"Reality matches claimed progress".to_string())
        );
    }

    #[tokio::test]
    async fn specific_check_requires_focus_areas() {
        let (checker, _dir, session_id) = checker_with_session(vec![]);
        let err = checker
            .perform_check(&session_id, CheckKind::Specific, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_parameters");
    }

    #[tokio::test]
    async fn documentation_focus_flags_missing_readme_as_fixable() {
        let (checker, _dir, session_id) = checker_with_session(vec![]);
        let report = checker
            .perform_check(&session_id, CheckKind::Specific, &["documentation".into()])
            .await
            .unwrap();

        let gap = report
            .discrepancies
            .iter()
            .find(|d| d.kind == DiscrepancyKind::DocumentationGap)
            .expect("missing README should be reported");
        assert!(gap.auto_fixable);
        assert_eq!(gap.severity, Severity::Warning);
    }

    #[tokio::test]
    async fn apply_fixes_creates_readme_and_reports_unknown_ids() {
        let (checker, dir, session_id) = checker_with_session(vec![]);
        let report = checker
            .perform_check(&session_id, CheckKind::Specific, &["documentation".into()])
            .await
            .unwrap();
        let fixable = report
            .discrepancies
            .iter()
            .find(|d| d.auto_fixable)
            .unwrap()
            .id
            .clone();

        let outcome = checker
            .apply_fixes(
                &report.snapshot_id,
                &[fixable.clone(), "disc-99".into()],
                false,
            )
            .await
            .unwrap();

        assert_eq!(outcome.applied, vec![fixable]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, "disc-99");
        assert!(dir.path().join("README.md").exists());
    }

    #[tokio::test]
    async fn validate_metrics_reports_variance() {
        let (checker, dir, session_id) = checker_with_session(vec![]);
        std::fs::write(dir.path().join("new.rs"), "fn a() {}\nfn b() {}\nfn c() {}\n").unwrap();

        let validations = checker
            .validate_metrics(
                &session_id,
                &ReportedMetrics {
                    lines_written: Some(3.0),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(validations.len(), 1);
        assert_eq!(validations[0].name, "lines_written");
    }
}
