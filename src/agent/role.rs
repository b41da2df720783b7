// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent roles.
//!
//! A role is the pair of capabilities that make one agent differ from
//! another: how it turns documents into a prompt, and how it turns the
//! model's reply into section edits. The cycle itself is shared and lives in
//! [`Agent`](super::Agent).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, ProposalError};
use crate::mutation::parse_sections;
use crate::store::templates::{EVALUATION, MANAGEMENT, PRODUCTION, REQUEST, SPECIFICATION};

use super::grammar::{self, MalformedLine, ACTIONS, DIRECTIVES, TASKS};

/// A read-only copy of a document an agent watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDocument {
    pub name: String,
    pub content: String,
}

/// Everything a role may use to build its prompt.
#[derive(Debug, Clone, Copy)]
pub struct ContextRequest<'a> {
    pub agent: &'a str,
    pub primary: &'a str,
    pub current: &'a str,
    pub watched: &'a [WatchedDocument],
}

/// Replacement body for one section of the primary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEdit {
    pub title: String,
    pub body: String,
}

impl SectionEdit {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// The usable part of a model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedProposal {
    pub edits: Vec<SectionEdit>,
    /// Lines or blocks that were dropped, with the reason.
    pub rejected: Vec<MalformedLine>,
}

/// The capability pair that specialises an agent.
pub trait AgentRole: Send + Sync {
    /// Which role this is.
    fn kind(&self) -> RoleKind;

    /// Build the prompt sent to the model.
    fn build_context(&self, request: &ContextRequest<'_>) -> String;

    /// Turn the model's reply into section edits.
    ///
    /// Fails only when nothing usable is left; partially valid replies keep
    /// their valid parts.
    fn validate(&self, response: &str) -> Result<ValidatedProposal, ProposalError>;
}

/// Built-in roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Specification,
    Management,
    Production,
    Evaluation,
}

impl RoleKind {
    /// All built-in roles, in pipeline order.
    pub const ALL: [RoleKind; 4] = [
        Self::Specification,
        Self::Management,
        Self::Production,
        Self::Evaluation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specification => "specification",
            Self::Management => "management",
            Self::Production => "production",
            Self::Evaluation => "evaluation",
        }
    }

    /// The document this role owns by default.
    pub fn default_primary(&self) -> &'static str {
        match self {
            Self::Specification => SPECIFICATION,
            Self::Management => MANAGEMENT,
            Self::Production => PRODUCTION,
            Self::Evaluation => EVALUATION,
        }
    }

    /// The documents this role reads by default.
    pub fn default_watched(&self) -> &'static [&'static str] {
        match self {
            Self::Specification => &[REQUEST, EVALUATION],
            Self::Management => &[REQUEST, SPECIFICATION, PRODUCTION, EVALUATION],
            Self::Production => &[SPECIFICATION, MANAGEMENT],
            Self::Evaluation => &[SPECIFICATION, PRODUCTION],
        }
    }

    /// Instantiate the role.
    pub fn build(&self) -> Arc<dyn AgentRole> {
        match self {
            Self::Management => Arc::new(ManagementRole),
            kind => Arc::new(DocumentRole::new(*kind)),
        }
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RoleKind {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "specification" | "spec" => Ok(Self::Specification),
            "management" | "manager" => Ok(Self::Management),
            "production" | "producer" => Ok(Self::Production),
            "evaluation" | "evaluator" => Ok(Self::Evaluation),
            other => Err(PoolError::UnknownRole(other.to_string())),
        }
    }
}

const REPLY_FORMAT: &str = "Reply with the complete new text of each section you want to change, \
each starting with its exact `# Title` heading line as listed above. Leave out sections you do \
not change. Do not add new sections. Reply with nothing else.";

/// Render the shared part of every prompt.
fn render_context(request: &ContextRequest<'_>, role: RoleKind, instructions: &str) -> String {
    let mut prompt = format!(
        "You are {agent}, the {role} agent of a team editing shared documents.\n{instructions}\n\n",
        agent = request.agent,
    );

    prompt.push_str(&format!("## Your document: {}\n", request.primary));
    let sections = parse_sections(request.current);
    if !sections.is_empty() {
        prompt.push_str("Sections:\n");
        for section in &sections {
            match &section.constraints {
                Some(constraints) => prompt.push_str(&format!(
                    "- {} (constraint: {constraints})\n",
                    section.title
                )),
                None => prompt.push_str(&format!("- {}\n", section.title)),
            }
        }
    }
    prompt.push_str(&format!("<<<\n{}\n>>>\n\n", request.current.trim_end()));

    for doc in request.watched {
        prompt.push_str(&format!(
            "## Reference (read-only): {}\n<<<\n{}\n>>>\n\n",
            doc.name,
            doc.content.trim_end()
        ));
    }

    prompt.push_str(REPLY_FORMAT);
    prompt
}

/// Strip a single surrounding code fence, if the whole reply is fenced.
fn unfence(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed;
    }
    let inner = &trimmed[..trimmed.len() - 3];
    match inner.find('\n') {
        Some(first_newline) => inner[first_newline + 1..].trim_end(),
        None => trimmed,
    }
}

/// Parse a plain markdown reply into one edit per top-level section.
///
/// A title that appears more than once is ambiguous; every copy is dropped.
pub fn parse_markdown_edits(response: &str) -> Result<ValidatedProposal, ProposalError> {
    let sections = parse_sections(unfence(response));
    if sections.is_empty() {
        return Err(ProposalError::MalformedResponse(
            "reply contains no top-level section".to_string(),
        ));
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for section in &sections {
        *counts.entry(section.title.as_str()).or_default() += 1;
    }

    let mut proposal = ValidatedProposal::default();
    for section in &sections {
        if counts[section.title.as_str()] > 1 {
            proposal.rejected.push(MalformedLine {
                section: section.title.clone(),
                line: format!("# {}", section.title),
                reason: "section appears more than once in the reply".to_string(),
            });
            continue;
        }
        proposal
            .edits
            .push(SectionEdit::new(section.title.clone(), section.body.clone()));
    }
    Ok(proposal)
}

/// A role whose reply is plain markdown sections.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRole {
    kind: RoleKind,
}

impl DocumentRole {
    pub fn new(kind: RoleKind) -> Self {
        Self { kind }
    }

    fn instructions(&self) -> &'static str {
        match self.kind {
            RoleKind::Specification => {
                "Turn the request into a precise specification: objective, scope, constraints \
                 and deliverables. Address the issues raised in the evaluation."
            }
            RoleKind::Production => {
                "Produce the artifact described by the specification, following the \
                 management directives and highest-priority tasks first."
            }
            RoleKind::Evaluation => {
                "Assess the production against the specification. List concrete issues and \
                 actionable suggestions."
            }
            RoleKind::Management => {
                "Coordinate the team through directives, prioritised tasks and an action log."
            }
        }
    }
}

impl AgentRole for DocumentRole {
    fn kind(&self) -> RoleKind {
        self.kind
    }

    fn build_context(&self, request: &ContextRequest<'_>) -> String {
        render_context(request, self.kind, self.instructions())
    }

    fn validate(&self, response: &str) -> Result<ValidatedProposal, ProposalError> {
        parse_markdown_edits(response)
    }
}

/// The management role: replies must follow the management grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagementRole;

const MANAGEMENT_INSTRUCTIONS: &str = "Coordinate the team. Keep three sections:\n\
# Directives: short free-text guidance for the other agents.\n\
# Tasks: one task per line as `- [PRIORITY] text`, PRIORITY one of CRITICAL, HIGH, MEDIUM, LOW.\n\
# Actions: one record per line as `- [YYYY-MM-DD HH:MM] section | impact | description`, \
impact one of major, minor, none.";

impl AgentRole for ManagementRole {
    fn kind(&self) -> RoleKind {
        RoleKind::Management
    }

    fn build_context(&self, request: &ContextRequest<'_>) -> String {
        render_context(request, RoleKind::Management, MANAGEMENT_INSTRUCTIONS)
    }

    fn validate(&self, response: &str) -> Result<ValidatedProposal, ProposalError> {
        let generic = parse_markdown_edits(response)?;
        let mut proposal = ValidatedProposal {
            edits: Vec::with_capacity(generic.edits.len()),
            rejected: generic.rejected,
        };

        for edit in generic.edits {
            let body = match edit.title.as_str() {
                DIRECTIVES => match grammar::parse_directives(&edit.body) {
                    Some(block) => format!("{}\n", block.render()),
                    None => {
                        proposal.rejected.push(MalformedLine {
                            section: DIRECTIVES.to_string(),
                            line: String::new(),
                            reason: "directive block is empty".to_string(),
                        });
                        continue;
                    }
                },
                TASKS | ACTIONS => {
                    let parser = if edit.title == TASKS {
                        grammar::parse_task
                    } else {
                        grammar::parse_action
                    };
                    let parsed = grammar::parse_list(&edit.title, &edit.body, parser);
                    proposal.rejected.extend(parsed.rejected.iter().cloned());
                    if parsed.items.is_empty() {
                        continue;
                    }
                    parsed.render()
                }
                _ => edit.body,
            };
            proposal.edits.push(SectionEdit::new(edit.title, body));
        }

        if proposal.edits.is_empty() {
            return Err(ProposalError::MalformedResponse(format!(
                "no valid management content ({} rejected line(s))",
                proposal.rejected.len()
            )));
        }
        Ok(proposal)
    }
}
