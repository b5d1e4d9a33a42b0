use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

const SOURCE_EXTENSIONS: [&str; 12] = [
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "rb", "c", "cpp", "sql",
];

const SKIP_DIRS: [&str; 6] = ["node_modules", ".git", "target", "dist", "build", ".cache"];

/// Pull path-shaped substrings out of free-text component claims.
/// A token qualifies when it contains a separator or ends in a known
/// source extension.
pub fn extract_paths(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();

    for raw in text.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
        let token = raw.trim_matches(|c: char| "\"'`()[]{}<>:".contains(c));
        if token.is_empty() || token.starts_with("http") {
            continue;
        }

        let has_separator = token.contains('/');
        let has_source_ext = Path::new(token)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e) || e == "md" || e == "json" || e == "toml")
            .unwrap_or(false);

        if has_separator || has_source_ext {
            seen.insert(token.to_string());
        }
    }

    seen.into_iter().collect()
}

fn skippable(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| SKIP_DIRS.contains(&name) || name.starts_with('.'))
        .unwrap_or(false)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

pub fn is_test_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let in_test_dir = path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("tests") | Some("test") | Some("__tests__")
        )
    });

    in_test_dir
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.ends_with("_test.rs")
        || name.ends_with("_test.py")
        || name.ends_with("_test.go")
}

/// Heuristic "actual lines written": line count of source files touched
/// after `since`. Glob-based on purpose; stricter counting is a caller
/// choice.
pub fn count_lines_modified_since(root: &Path, since: &DateTime<Utc>) -> u64 {
    let mut total = 0u64;

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !skippable(e))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_source_file(path) {
            continue;
        }
        let modified_after = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(|mtime| {
                let mtime: DateTime<Utc> = mtime.into();
                mtime >= *since
            })
            .unwrap_or(false);
        if !modified_after {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            total += content.lines().count() as u64;
        }
    }

    total
}

/// Heuristic test count: 5 tests per test file.
pub fn estimate_test_count(root: &Path) -> u64 {
    let files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !skippable(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_source_file(e.path()) && is_test_file(e.path()))
        .count() as u64;

    files * 5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extracts_path_shaped_tokens() {
        let paths = extract_paths("Implemented src/managers/session.rs and wired config.toml");
        assert!(paths.contains(&"src/managers/session.rs".to_string()));
        assert!(paths.contains(&"config.toml".to_string()));
        assert!(!paths.contains(&"Implemented".to_string()));
    }

    #[test]
    fn ignores_urls_and_bare_words() {
        let paths = extract_paths("See https://example.com/docs for the core loop");
        assert!(paths.is_empty());
    }

    #[test]
    fn test_file_detection() {
        assert!(is_test_file(&PathBuf::from("tests/storage_tests.rs")));
        assert!(is_test_file(&PathBuf::from("src/app.test.ts")));
        assert!(is_test_file(&PathBuf::from("pkg/io_test.go")));
        assert!(!is_test_file(&PathBuf::from("src/app.ts")));
    }

    #[test]
    fn counts_lines_in_recent_source_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not source\n").unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(count_lines_modified_since(dir.path(), &since), 2);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(count_lines_modified_since(dir.path(), &future), 0);
    }

    #[test]
    fn estimates_five_tests_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/one.rs"), "#[test] fn t() {}\n").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();

        assert_eq!(estimate_test_count(dir.path()), 5);
    }
}
