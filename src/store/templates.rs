// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Default document templates and the placeholder convention.

use crate::mutation::parse_sections;

/// Body text of a section nobody has written yet.
pub const PLACEHOLDER: &str = "_Pending._";

/// The user's request.
pub const REQUEST: &str = "request";
/// What should be built.
pub const SPECIFICATION: &str = "specification";
/// Directives, prioritised tasks and the action log.
pub const MANAGEMENT: &str = "management";
/// The artifact itself.
pub const PRODUCTION: &str = "production";
/// Review of the artifact against the specification.
pub const EVALUATION: &str = "evaluation";
/// Append-only record of agent writes.
pub const ACTIVITY_LOG: &str = "activity-log";

/// Section of the activity log that receives entries.
pub const ACTIVITY_SECTION: &str = "Entries";

/// Documents every mission is created with.
pub const REQUIRED_DOCUMENTS: &[&str] = &[
    REQUEST,
    SPECIFICATION,
    MANAGEMENT,
    PRODUCTION,
    EVALUATION,
    ACTIVITY_LOG,
];

/// Deterministic initial content for a document.
pub fn default_template(name: &str) -> String {
    match name {
        REQUEST => sections(&["Request"]),
        SPECIFICATION => sections(&["Objective", "Scope", "Constraints", "Deliverables"]),
        MANAGEMENT => sections(&["Directives", "Tasks", "Actions"]),
        PRODUCTION => sections(&["Content"]),
        EVALUATION => sections(&["Assessment", "Issues", "Suggestions"]),
        ACTIVITY_LOG => format!("# {ACTIVITY_SECTION}\n"),
        other => sections(&[&title_case(other)]),
    }
}

fn sections(titles: &[&str]) -> String {
    titles
        .iter()
        .map(|title| format!("# {title}\n{PLACEHOLDER}\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn title_case(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Check whether a document carries no real content yet.
///
/// True when every section body is blank or the placeholder marker.
pub fn is_placeholder(content: &str) -> bool {
    let sections = parse_sections(content);
    if sections.is_empty() {
        return content.trim().is_empty();
    }
    sections.iter().all(|section| {
        let body = section.body.trim();
        body.is_empty() || body == PLACEHOLDER
    })
}
