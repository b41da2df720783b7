// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent types and configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::ProposalError;
use crate::llm::SharedModel;
use crate::store::DocumentStore;

use super::role::RoleKind;
use super::state::DEFAULT_MAX_RETRIES;

/// Default pause between two cycles.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single model call.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Declarative description of one agent, as found in configuration.
///
/// Unset fields fall back to the role's defaults and to [`AgentOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub name: String,
    pub role: RoleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AgentSpec {
    /// An agent named after its role, with every default.
    pub fn for_role(role: RoleKind) -> Self {
        Self {
            name: role.as_str().to_string(),
            role,
            primary: None,
            watched: None,
            interval_secs: None,
            max_retries: None,
            enabled: true,
        }
    }

    /// The document this agent owns.
    pub fn primary(&self) -> &str {
        self.primary
            .as_deref()
            .unwrap_or_else(|| self.role.default_primary())
    }

    /// The documents this agent reads.
    pub fn watched(&self) -> Vec<String> {
        match &self.watched {
            Some(watched) => watched.clone(),
            None => self
                .role
                .default_watched()
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// One agent per built-in role.
pub fn default_agents() -> Vec<AgentSpec> {
    RoleKind::ALL.iter().map(|r| AgentSpec::for_role(*r)).collect()
}

/// Resources and defaults shared by every agent of a pool.
#[derive(Clone)]
pub struct AgentOptions {
    pub store: Arc<DocumentStore>,
    pub model: SharedModel,
    pub cache: Arc<TtlCache<String>>,
    /// Bound on each model call.
    pub llm_timeout: Duration,
    /// Pause between cycles, unless an `AgentSpec` overrides it.
    pub interval: Duration,
    /// Retry budget, unless an `AgentSpec` overrides it.
    pub max_retries: u32,
}

impl AgentOptions {
    /// Options with default timings and a fresh cache.
    pub fn new(store: Arc<DocumentStore>, model: SharedModel) -> Self {
        Self {
            store,
            model,
            cache: Arc::new(TtlCache::new()),
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            interval: DEFAULT_CYCLE_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TtlCache<String>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("store", &self.store.root())
            .field("model", &self.model.name())
            .field("llm_timeout", &self.llm_timeout)
            .field("interval", &self.interval)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every input was still a placeholder.
    Skipped,
    /// The proposal left the document as it was.
    Unchanged,
    /// The primary document was rewritten.
    Written {
        applied: Vec<String>,
        skipped: Vec<String>,
    },
    /// No usable proposal was obtained.
    NoProposal(ProposalError),
    /// The store refused the write (lock timeout or I/O).
    WriteRejected,
    /// The primary document could not be read.
    ReadFailed(String),
}

impl CycleOutcome {
    /// Check if the cycle counted as a failure.
    pub fn is_error(&self) -> bool {
        match self {
            Self::NoProposal(e) => e.counts_as_failure(),
            Self::WriteRejected | Self::ReadFailed(_) => true,
            Self::Skipped | Self::Unchanged | Self::Written { .. } => false,
        }
    }
}
