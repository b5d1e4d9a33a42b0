use std::path::{Path, PathBuf};

use cadence_types::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

static PASSING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+passing").unwrap());
static FAILING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+failing").unwrap());

/// Result of running the project's test command. Absent counts mean the
/// output carried no parsable data, which is not a failure by itself.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub passing: Option<u64>,
    pub failing: Option<u64>,
    pub exit_ok: bool,
    pub raw_tail: String,
}

/// The project's declared test command, discovered from a conventional
/// descriptor file in the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TestCommand {
    /// `package.json` with a test script wins; a `Cargo.toml` falls back to
    /// `cargo test`. No descriptor means no test check.
    pub fn discover(root: &Path) -> Option<Self> {
        let package_json = root.join("package.json");
        if package_json.exists() {
            let has_test_script = std::fs::read_to_string(&package_json)
                .ok()
                .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
                .map(|pkg| pkg["scripts"]["test"].is_string())
                .unwrap_or(false);
            if has_test_script {
                return Some(Self {
                    program: "npm".into(),
                    args: vec!["test".into(), "--silent".into()],
                });
            }
        }

        if root.join("Cargo.toml").exists() {
            return Some(Self {
                program: "cargo".into(),
                args: vec!["test".into()],
            });
        }

        None
    }

    pub async fn run(&self, root: &PathBuf) -> Result<TestOutcome> {
        debug!(program = %self.program, "running project test command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(root)
            .output()
            .await
            .map_err(|e| Error::ExternalTool {
                message: format!("failed to spawn {}", self.program),
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}\n{}", stdout, stderr);

        let outcome = TestOutcome {
            passing: parse_count(&PASSING_RE, &combined),
            failing: parse_count(&FAILING_RE, &combined),
            exit_ok: output.status.success(),
            raw_tail: tail(&combined, 2000),
        };

        // Non-zero exit with no parsable counts is a real tool failure.
        if !outcome.exit_ok && outcome.passing.is_none() && outcome.failing.is_none() {
            return Err(Error::ExternalTool {
                message: format!("{} exited non-zero with no test counts", self.program),
                stderr: tail(&stderr, 2000),
            });
        }

        Ok(outcome)
    }
}

fn parse_count(re: &Regex, haystack: &str) -> Option<u64> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s[s.len() - max..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_passing_and_failing_counts() {
        let out = "  12 passing (340ms)\n  2 failing\n";
        assert_eq!(parse_count(&PASSING_RE, out), Some(12));
        assert_eq!(parse_count(&FAILING_RE, out), Some(2));
    }

    #[test]
    fn missing_counts_are_no_data() {
        assert_eq!(parse_count(&PASSING_RE, "all good"), None);
    }

    #[test]
    fn discovery_prefers_package_json_test_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"test": "mocha"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();

        let cmd = TestCommand::discover(dir.path()).unwrap();
        assert_eq!(cmd.program, "npm");
    }

    #[test]
    fn discovery_falls_back_to_cargo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let cmd = TestCommand::discover(dir.path()).unwrap();
        assert_eq!(cmd.program, "cargo");
    }

    #[test]
    fn no_descriptor_means_no_test_check() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(TestCommand::discover(dir.path()), None);
    }
}
