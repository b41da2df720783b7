// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-agent lifecycle state.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of consecutive failed cycles tolerated before an agent is
/// reported unhealthy.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Where an agent is in its current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Between cycles, or skipping a cycle with nothing to do.
    Waiting,
    /// Running a cycle.
    Active,
    /// Last cycle finished without error.
    Completed,
    /// Last cycle failed.
    Error,
}

impl AgentStatus {
    /// Symbol used in log lines and the CLI.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Waiting => "○",
            Self::Active => "◐",
            Self::Completed => "✓",
            Self::Error => "✗",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Lifecycle bookkeeping for one agent.
///
/// Only the owning agent writes it; everyone else reads snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub name: String,
    pub status: AgentStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Consecutive failed cycles.
    pub retries: u32,
    pub max_retries: u32,
    /// End of the last cycle that was not skipped.
    pub last_run: Option<DateTime<Utc>>,
    /// Last time this agent persisted a change.
    pub last_change: Option<DateTime<Utc>>,
    /// Cycles run, skipped ones excluded.
    pub cycles: u64,
}

impl AgentState {
    /// Create a fresh state in `Waiting`.
    pub fn new(name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            status: AgentStatus::Waiting,
            start_time: None,
            end_time: None,
            error_message: None,
            retries: 0,
            max_retries,
            last_run: None,
            last_change: None,
            cycles: 0,
        }
    }

    /// Enter a cycle.
    pub fn mark_active(&mut self) {
        self.status = AgentStatus::Active;
        self.start_time = Some(Utc::now());
    }

    /// Finish a cycle successfully. Clears the error and the retry count.
    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.status = AgentStatus::Completed;
        self.end_time = Some(now);
        self.last_run = Some(now);
        self.error_message = None;
        self.retries = 0;
        self.cycles += 1;
    }

    /// Finish a cycle with an error.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.status = AgentStatus::Error;
        self.end_time = Some(now);
        self.last_run = Some(now);
        self.error_message = Some(message.into());
        self.retries = self.retries.saturating_add(1);
        self.cycles += 1;
    }

    /// Go back to waiting without touching counters.
    pub fn mark_waiting(&mut self) {
        self.status = AgentStatus::Waiting;
    }

    /// Record that a change was persisted.
    pub fn mark_changed(&mut self) {
        self.last_change = Some(Utc::now());
    }

    /// Whether the agent is still within its retry budget.
    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Health as seen by the pool monitor. Advisory only.
    pub fn is_healthy(&self) -> bool {
        self.can_retry()
    }
}

/// State shared between an agent and the pool that observes it.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<RwLock<AgentState>>);

impl SharedState {
    pub fn new(state: AgentState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> AgentState {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Apply a change. Only the owning agent calls this.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> R {
        let mut state = self
            .0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }
}
