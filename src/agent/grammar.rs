// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Grammar for the management document.
//!
//! The management document has three structured sections:
//!
//! ```text
//! # Directives
//! free text, kept as one block
//!
//! # Tasks
//! - [HIGH] Draft the scope section
//! - [low] Tidy wording
//!
//! # Actions
//! - [2026-03-01 14:05] Scope | major | Narrowed to the CLI surface
//! ```
//!
//! Each line of `Tasks` and `Actions` parses into a [`ManagementItem`] or a
//! [`MalformedLine`]. Malformed lines are dropped; the rest is rendered back in
//! canonical form.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::store::PLACEHOLDER;

/// Title of the free-text section.
pub const DIRECTIVES: &str = "Directives";
/// Title of the task list section.
pub const TASKS: &str = "Tasks";
/// Title of the action log section.
pub const ACTIONS: &str = "Actions";

/// Timestamp format written into action records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Task priority tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CRITICAL" => Ok(Self::Critical),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// How much an action changed the document it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Major,
    Minor,
    None,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for Impact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "none" => Ok(Self::None),
            other => Err(format!("unknown impact '{other}'")),
        }
    }
}

/// One parsed element of the management document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementItem {
    DirectiveBlock(String),
    TaskItem {
        priority: Priority,
        text: String,
    },
    ActionRecord {
        timestamp: NaiveDateTime,
        section: String,
        impact: Impact,
        description: String,
    },
}

impl ManagementItem {
    /// Canonical text form.
    pub fn render(&self) -> String {
        match self {
            Self::DirectiveBlock(text) => text.trim().to_string(),
            Self::TaskItem { priority, text } => format!("- [{}] {}", priority.as_str(), text),
            Self::ActionRecord {
                timestamp,
                section,
                impact,
                description,
            } => format!(
                "- [{}] {} | {} | {}",
                timestamp.format(TIMESTAMP_FORMAT),
                section,
                impact.as_str(),
                description
            ),
        }
    }
}

/// A line that did not match its section's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub section: String,
    pub line: String,
    pub reason: String,
}

/// Split `- [tag] rest` into `(tag, rest)`.
fn bracketed_item(line: &str) -> Result<(&str, &str), String> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .ok_or_else(|| "expected a list item starting with '- '".to_string())?
        .trim_start();
    let rest = rest
        .strip_prefix('[')
        .ok_or_else(|| "expected '[' after the list marker".to_string())?;
    let close = rest
        .find(']')
        .ok_or_else(|| "unterminated '[' tag".to_string())?;
    Ok((&rest[..close], rest[close + 1..].trim()))
}

/// Parse `- [PRIORITY] text`.
pub fn parse_task(line: &str) -> Result<ManagementItem, String> {
    let (tag, text) = bracketed_item(line.trim())?;
    let priority = tag.parse::<Priority>()?;
    if text.is_empty() {
        return Err("task text is empty".to_string());
    }
    Ok(ManagementItem::TaskItem {
        priority,
        text: text.to_string(),
    })
}

/// Parse `- [YYYY-MM-DD HH:MM] section | impact | description`.
pub fn parse_action(line: &str) -> Result<ManagementItem, String> {
    let (tag, rest) = bracketed_item(line.trim())?;
    let timestamp = parse_timestamp(tag)?;

    let fields: Vec<&str> = rest.split('|').map(str::trim).collect();
    let [section, impact, description] = fields.as_slice() else {
        return Err(format!(
            "expected 'section | impact | description', found {} field(s)",
            fields.len()
        ));
    };
    if section.is_empty() {
        return Err("action section is empty".to_string());
    }
    if description.is_empty() {
        return Err("action description is empty".to_string());
    }

    Ok(ManagementItem::ActionRecord {
        timestamp,
        section: section.to_string(),
        impact: impact.parse()?,
        description: description.to_string(),
    })
}

fn parse_timestamp(tag: &str) -> Result<NaiveDateTime, String> {
    let tag = tag.trim();
    NaiveDateTime::parse_from_str(tag, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(tag, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(tag, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| format!("invalid timestamp '{tag}'"))
}

/// Result of parsing a list section line by line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedList {
    pub items: Vec<ManagementItem>,
    pub rejected: Vec<MalformedLine>,
}

impl ParsedList {
    /// Canonical body for the accepted items.
    pub fn render(&self) -> String {
        let mut body = self
            .items
            .iter()
            .map(ManagementItem::render)
            .collect::<Vec<_>>()
            .join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        body
    }
}

/// Parse every non-blank line of a list section with `parse_line`.
pub fn parse_list(
    section: &str,
    body: &str,
    parse_line: fn(&str) -> Result<ManagementItem, String>,
) -> ParsedList {
    let mut parsed = ParsedList::default();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == PLACEHOLDER {
            continue;
        }
        match parse_line(trimmed) {
            Ok(item) => parsed.items.push(item),
            Err(reason) => parsed.rejected.push(MalformedLine {
                section: section.to_string(),
                line: trimmed.to_string(),
                reason,
            }),
        }
    }
    parsed
}

/// Parse the directives section into a single block.
pub fn parse_directives(body: &str) -> Option<ManagementItem> {
    let text = body.trim();
    (!text.is_empty() && text != PLACEHOLDER)
        .then(|| ManagementItem::DirectiveBlock(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_task() {
        let item = parse_task("- [HIGH] Draft the scope").unwrap();
        assert_eq!(
            item,
            ManagementItem::TaskItem {
                priority: Priority::High,
                text: "Draft the scope".to_string()
            }
        );
        assert_eq!(item.render(), "- [HIGH] Draft the scope");
    }

    #[test]
    fn test_parse_task_case_insensitive_priority() {
        let item = parse_task("* [critical]   Fix the build").unwrap();
        assert_eq!(item.render(), "- [CRITICAL] Fix the build");
    }

    #[test]
    fn test_parse_task_rejects_bad_lines() {
        assert!(parse_task("Draft the scope").is_err());
        assert!(parse_task("- Draft the scope").is_err());
        assert!(parse_task("- [URGENT] Draft").unwrap_err().contains("unknown priority"));
        assert!(parse_task("- [LOW]").unwrap_err().contains("empty"));
        assert!(parse_task("- [LOW Draft").unwrap_err().contains("unterminated"));
    }

    #[test]
    fn test_parse_action() {
        let item = parse_action("- [2026-03-01 14:05] Scope | major | Narrowed to the CLI").unwrap();
        let expected_ts = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(
            item,
            ManagementItem::ActionRecord {
                timestamp: expected_ts,
                section: "Scope".to_string(),
                impact: Impact::Major,
                description: "Narrowed to the CLI".to_string(),
            }
        );
        assert_eq!(item.render(), "- [2026-03-01 14:05] Scope | major | Narrowed to the CLI");
    }

    #[test]
    fn test_parse_action_accepts_seconds() {
        let item = parse_action("- [2026-03-01 14:05:09] Scope | none | Checked").unwrap();
        assert_eq!(item.render(), "- [2026-03-01 14:05] Scope | none | Checked");
    }

    #[test]
    fn test_parse_action_rejects_bad_lines() {
        assert!(parse_action("- [yesterday] Scope | major | x").unwrap_err().contains("timestamp"));
        assert!(parse_action("- [2026-03-01 14:05] Scope | major").unwrap_err().contains("field"));
        assert!(parse_action("- [2026-03-01 14:05] Scope | huge | x").unwrap_err().contains("impact"));
        assert!(parse_action("- [2026-03-01 14:05]  | minor | x").is_err());
    }

    #[test]
    fn test_parse_list_keeps_valid_lines() {
        let body = "- [HIGH] One\nnot a task\n\n- [LOW] Two\n_Pending._\n";
        let parsed = parse_list(TASKS, body, parse_task);
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].line, "not a task");
        assert_eq!(parsed.rejected[0].section, TASKS);
        assert_eq!(parsed.render(), "- [HIGH] One\n- [LOW] Two\n");
    }

    #[test]
    fn test_parse_directives() {
        assert_eq!(parse_directives("  \n"), None);
        assert_eq!(parse_directives("_Pending._"), None);
        assert_eq!(
            parse_directives("\nFocus on scope.\nKeep it short.\n"),
            Some(ManagementItem::DirectiveBlock("Focus on scope.\nKeep it short.".to_string()))
        );
    }
}
