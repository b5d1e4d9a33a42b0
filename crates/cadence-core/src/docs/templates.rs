use std::collections::HashMap;

use cadence_types::DocumentKind;

// Markdown skeletons. `{{name}}` placeholders are substituted from the
// session and caller context; unresolved placeholders render empty.

const README_TEMPLATE: &str = "# {{project}}\n\n{{summary}}\n\n## Status\n\n- Session: {{session_id}}\n- Phase: {{phase}}\n- Progress: {{lines_written}} lines, {{tests_passing}} tests passing\n\n## Getting started\n\n{{getting_started}}\n";

const API_TEMPLATE: &str = "# {{project}} API\n\n{{summary}}\n\n## Operations\n\n{{operations}}\n\n## Errors\n\n{{errors}}\n";

const ARCHITECTURE_TEMPLATE: &str = "# {{project}} architecture\n\n{{summary}}\n\n## Components\n\n{{components}}\n\n## Data flow\n\n{{data_flow}}\n";

const HANDOFF_TEMPLATE: &str = "# Handoff: {{project}}\n\n- Session: {{session_id}}\n- Context used: {{context_used}} / {{context_budget}} tokens ({{usage_percent}}%)\n- Phase reached: {{phase}}\n\n## Completed\n\n{{completed}}\n\n## Next goals\n\n{{next_goals}}\n\n## Context requirements\n\n{{context_requirements}}\n\n## Continuation notes\n\n{{notes}}\n";

pub fn template_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Readme => README_TEMPLATE,
        DocumentKind::Api => API_TEMPLATE,
        DocumentKind::Architecture => ARCHITECTURE_TEMPLATE,
        DocumentKind::Handoff => HANDOFF_TEMPLATE,
    }
}

/// Replace `{{key}}` placeholders; unknown keys become empty strings so a
/// partially-filled context still renders a valid document.
pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = values.get(key) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Section headings present in a rendered markdown document
pub fn extract_sections(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            trimmed
                .strip_prefix("## ")
                .or_else(|| trimmed.strip_prefix("# "))
                .map(|s| s.trim().to_string())
        })
        .collect()
}

pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_known_and_drops_unknown() {
        let mut values = HashMap::new();
        values.insert("project".to_string(), "demo".to_string());
        let rendered = render("# {{project}} {{missing}}!", &values);
        assert_eq!(rendered, "# demo !");
    }

    #[test]
    fn render_keeps_unterminated_braces_literal() {
        let rendered = render("tail {{broken", &HashMap::new());
        assert_eq!(rendered, "tail {{broken");
    }

    #[test]
    fn sections_come_from_headings() {
        let doc = "# Title\n\nbody\n\n## First\n\n## Second\n";
        assert_eq!(extract_sections(doc), vec!["Title", "First", "Second"]);
    }

    #[test]
    fn every_kind_has_a_template() {
        for kind in [
            DocumentKind::Readme,
            DocumentKind::Api,
            DocumentKind::Architecture,
            DocumentKind::Handoff,
        ] {
            assert!(template_for(kind).contains("{{"));
        }
    }
}
