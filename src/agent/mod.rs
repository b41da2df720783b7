// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent module - one autonomous editor per document.
//!
//! An agent owns one primary document and watches a few others. Each cycle
//! it reads them, asks the model for a proposal, applies the proposal
//! section by section and persists the result:
//!
//! ```text
//! read primary + watched -> skip if all placeholders -> prompt (cache / model)
//!   -> validate into section edits -> section_replace each -> write -> log
//! ```
//!
//! Failures never leave the loop. They are recorded in the agent's
//! [`AgentState`] and the next cycle starts after the usual interval.
//!
//! # Example
//!
//! ```rust,ignore
//! use concord::agent::{Agent, AgentOptions, AgentSpec, RoleKind};
//!
//! let options = AgentOptions::new(store, model);
//! let mut agent = Agent::new(&AgentSpec::for_role(RoleKind::Evaluation), &options);
//! let outcome = agent.run_cycle().await;
//! ```

pub mod grammar;
mod role;
mod state;
mod types;

pub use role::{
    parse_markdown_edits, AgentRole, ContextRequest, DocumentRole, ManagementRole, RoleKind,
    SectionEdit, ValidatedProposal, WatchedDocument,
};
pub use state::{AgentState, AgentStatus, SharedState, DEFAULT_MAX_RETRIES};
pub use types::{
    default_agents, AgentOptions, AgentSpec, CycleOutcome, DEFAULT_CYCLE_INTERVAL,
    DEFAULT_LLM_TIMEOUT,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::cache::TtlCache;
use crate::error::ProposalError;
use crate::llm::SharedModel;
use crate::mutation::{add_to_section, section_body, section_replace, InsertPosition};
use crate::store::templates::{ACTIVITY_LOG, ACTIVITY_SECTION};
use crate::store::{is_placeholder, DocumentStore};
use crate::timeout::TimeoutGuard;

/// A scheduled editor of one document.
pub struct Agent {
    name: String,
    role: Arc<dyn AgentRole>,
    primary: String,
    watched: Vec<String>,
    interval: Duration,
    store: Arc<DocumentStore>,
    model: SharedModel,
    cache: Arc<TtlCache<String>>,
    guard: TimeoutGuard,
    state: SharedState,
    /// What this agent last persisted.
    current_content: Option<String>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("role", &self.role.kind())
            .field("primary", &self.primary)
            .field("watched", &self.watched)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Agent {
    /// Build an agent from its spec and the pool's shared options.
    pub fn new(spec: &AgentSpec, options: &AgentOptions) -> Self {
        let max_retries = spec.max_retries.unwrap_or(options.max_retries);
        let interval = spec
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or(options.interval);

        Self {
            name: spec.name.clone(),
            role: spec.role.build(),
            primary: spec.primary().to_string(),
            watched: spec.watched(),
            interval,
            store: options.store.clone(),
            model: options.model.clone(),
            cache: options.cache.clone(),
            guard: TimeoutGuard::new(options.llm_timeout),
            state: SharedState::new(AgentState::new(spec.name.clone(), max_retries)),
            current_content: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle on this agent's state, for observers.
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Text of the last successful write, if any.
    pub fn current_content(&self) -> Option<&str> {
        self.current_content.as_deref()
    }

    /// Loop over cycles until `token` is cancelled.
    ///
    /// Cancellation is observed between cycles and during the pause; a
    /// cycle in progress always runs to completion.
    pub async fn run(&mut self, token: CancellationToken) {
        info!(agent = %self.name, role = %self.role.kind(), document = %self.primary, "Agent started");

        while !token.is_cancelled() {
            let outcome = self.run_cycle().await;
            debug!(agent = %self.name, ?outcome, "Cycle finished");

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state.update(|s| s.mark_waiting());
        info!(agent = %self.name, "Agent stopped");
    }

    /// Run one read/propose/write cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        self.state.update(|s| s.mark_active());
        let outcome = self.cycle().await;

        match &outcome {
            CycleOutcome::Skipped => self.state.update(|s| s.mark_waiting()),
            CycleOutcome::Unchanged => self.state.update(|s| s.mark_completed()),
            CycleOutcome::Written { applied, skipped } => {
                info!(
                    agent = %self.name,
                    document = %self.primary,
                    applied = applied.len(),
                    skipped = skipped.len(),
                    "✓ Proposal applied"
                );
                self.state.update(|s| {
                    s.mark_changed();
                    s.mark_completed();
                });
            }
            CycleOutcome::NoProposal(e) if !e.counts_as_failure() => {
                warn!(agent = %self.name, error = %e, "⚠ Proposal discarded");
                self.state.update(|s| s.mark_completed());
            }
            CycleOutcome::NoProposal(e) => {
                error!(agent = %self.name, error = %e, "✗ No proposal");
                self.state.update(|s| s.mark_error(e.to_string()));
            }
            CycleOutcome::WriteRejected => {
                error!(agent = %self.name, document = %self.primary, "✗ Write rejected");
                self.state
                    .update(|s| s.mark_error(format!("write to {} rejected", self.primary)));
            }
            CycleOutcome::ReadFailed(message) => {
                error!(agent = %self.name, document = %self.primary, error = %message, "✗ Read failed");
                self.state.update(|s| s.mark_error(message.clone()));
            }
        }

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("agent.cycle", start.elapsed());
            if outcome.is_error() {
                GLOBAL_METRICS.increment("agent.cycle.failed");
            }
        }

        let state = self.state.snapshot();
        if outcome.is_error() && !state.can_retry() {
            warn!(
                agent = %self.name,
                retries = state.retries,
                max_retries = state.max_retries,
                "⚠ Retry budget exhausted"
            );
        }

        outcome
    }

    async fn cycle(&mut self) -> CycleOutcome {
        let current = match self.store.read(&self.primary).await {
            Ok(text) => text,
            Err(e) => return CycleOutcome::ReadFailed(e.to_string()),
        };
        let watched = self.read_watched().await;

        if is_placeholder(&current) && watched.iter().all(|d| is_placeholder(&d.content)) {
            debug!(agent = %self.name, "Nothing to work from yet, skipping");
            return CycleOutcome::Skipped;
        }

        let prompt = self.role.build_context(&ContextRequest {
            agent: &self.name,
            primary: &self.primary,
            current: &current,
            watched: &watched,
        });

        let proposal = match self.propose(&prompt).await {
            Ok(proposal) => proposal,
            Err(e) => return CycleOutcome::NoProposal(e),
        };

        let mut working = current.clone();
        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        for edit in &proposal.edits {
            let body = normalize_body(&edit.body, section_body(&working, &edit.title));
            let result = section_replace(&working, &edit.title, &body);
            match result.new_content {
                Some(next) if result.success => {
                    working = next;
                    applied.push(edit.title.clone());
                }
                _ => {
                    warn!(
                        agent = %self.name,
                        document = %self.primary,
                        section = %edit.title,
                        reason = %result.message,
                        "⚠ Edit skipped"
                    );
                    skipped.push(edit.title.clone());
                }
            }
        }

        if working == current {
            debug!(agent = %self.name, "Proposal left the document unchanged");
            return CycleOutcome::Unchanged;
        }

        if !self.store.write(&self.primary, &working).await {
            return CycleOutcome::WriteRejected;
        }
        self.current_content = Some(working);
        self.append_activity(&applied).await;

        CycleOutcome::Written { applied, skipped }
    }

    async fn read_watched(&self) -> Vec<WatchedDocument> {
        let mut documents = Vec::with_capacity(self.watched.len());
        for name in &self.watched {
            match self.store.read(name).await {
                Ok(content) => documents.push(WatchedDocument {
                    name: name.clone(),
                    content,
                }),
                Err(e) => {
                    warn!(agent = %self.name, document = %name, error = %e, "⚠ Could not read watched document");
                }
            }
        }
        documents
    }

    /// Get a validated proposal for `prompt`, from the cache when possible.
    async fn propose(&self, prompt: &str) -> Result<ValidatedProposal, ProposalError> {
        let key = TtlCache::<String>::make_key(&[prompt]);
        let (reply, cached) = match self.cache.get(&self.name, &key) {
            Some(reply) => (reply, true),
            None => (self.generate(prompt).await?, false),
        };
        if cached {
            debug!(agent = %self.name, "Using cached proposal");
        }

        let proposal = self.role.validate(&reply)?;
        for rejected in &proposal.rejected {
            warn!(
                agent = %self.name,
                section = %rejected.section,
                line = %rejected.line,
                reason = %rejected.reason,
                "⚠ Malformed proposal line dropped"
            );
        }

        if !cached {
            self.cache.set(&self.name, key, reply);
        }
        Ok(proposal)
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProposalError> {
        let start = Instant::now();
        let timeout = self.guard.deadline();
        let reply = self
            .guard
            .run("llm.generate", self.model.generate(prompt, timeout))
            .await
            .map_err(|e| ProposalError::Timeout(e.after))??;
        debug!(
            agent = %self.name,
            model = %self.model.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            reply_chars = reply.len(),
            "Model replied"
        );
        Ok(reply)
    }

    async fn append_activity(&self, sections: &[String]) {
        if self.primary == ACTIVITY_LOG {
            return;
        }
        let entry = format!(
            "- [{}] {} updated {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.name,
            self.primary,
            sections.join(", ")
        );
        let result = self
            .store
            .update(ACTIVITY_LOG, |text| {
                add_to_section(text, ACTIVITY_SECTION, &entry, InsertPosition::End)
            })
            .await;
        match result {
            Ok(result) if result.success => {}
            Ok(result) => {
                warn!(agent = %self.name, reason = %result.message, "⚠ Activity log not updated")
            }
            Err(e) => warn!(agent = %self.name, error = %e, "⚠ Activity log not updated"),
        }
    }
}

/// Canonical form of a proposed section body.
///
/// Leading blank lines and trailing whitespace are dropped, then the
/// replaced body's run of trailing newlines (at least one) is restored so
/// spacing between sections survives. Empty stays empty.
fn normalize_body(body: &str, previous: Option<&str>) -> String {
    let trimmed = body.trim_start_matches(['\r', '\n']).trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    let trailing = previous
        .map(|p| p.len() - p.trim_end_matches('\n').len())
        .unwrap_or(1)
        .max(1);
    format!("{trimmed}{}", "\n".repeat(trailing))
}
