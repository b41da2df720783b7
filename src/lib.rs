// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Concord - a pool of LLM agents editing shared markdown documents.
//!
//! Each agent owns one document of a mission, watches a few others, and
//! periodically proposes section-level rewrites of its own document. Writes
//! are serialized per document with a lock; everything else is best-effort.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`mutation`] - Section-addressed text mutations with uniqueness checks
//! - [`store`] - Mission directories, document locking and change notification
//! - [`llm`] - The language model seam and an OpenAI-compatible client
//! - [`agent`] - Agent life cycle, role strategies and the management grammar
//! - [`pool`] - Agent tasks, start/stop/toggle and the health monitor
//! - [`cache`] - TTL cache for model replies
//! - [`timeout`] - Wall-clock bounds on external calls
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Tracing subscriber setup and in-process metrics
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use concord::config::{load_config, CliOptions};
//! use concord::llm::OpenAiCompatibleModel;
//! use concord::pool::AgentPool;
//! use concord::store::Missions;
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let missions = Missions::with_options(&config.missions_dir, config.store_options());
//! let store = Arc::new(missions.create("haiku").await?);
//! let model = Arc::new(OpenAiCompatibleModel::new(config.model_settings())?);
//! let options = config.agent_options(store, model);
//! let mut pool = AgentPool::new(&config.agents, &options, config.pool_settings())?;
//! pool.start_all();
//! ```

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod mutation;
pub mod pool;
pub mod store;
pub mod telemetry;
pub mod timeout;

// Re-export commonly used types at crate root
pub use agent::{Agent, AgentOptions, AgentSpec, AgentState, AgentStatus, CycleOutcome, RoleKind};
pub use cache::TtlCache;
pub use error::{ConfigError, PoolError, ProposalError, Result, StoreError};
pub use llm::{LanguageModel, OpenAiCompatibleModel, SharedModel};
pub use mutation::{add_to_section, exact_replace, parse_sections, section_replace, MutationResult};
pub use pool::AgentPool;
pub use store::{DocumentStore, Missions};
pub use timeout::{TimeoutError, TimeoutGuard};

/// Concord version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
