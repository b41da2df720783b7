// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent pool: starts, stops and watches a mission's agents.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  AgentPool                    │
//! │  root CancellationToken                       │
//! │   ├── child token ──► agent task (spec)       │
//! │   ├── child token ──► agent task (mgmt)       │
//! │   ├── ...                                     │
//! │   └── child token ──► monitor task            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every agent runs in its own tokio task. Stopping cancels the agent's
//! token and waits a bounded time for the task to finish; tasks that do not
//! finish in time are aborted and reported by [`AgentPool::abandoned`].
//!
//! The monitor only reports. An unhealthy agent keeps running.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentOptions, AgentSpec, AgentStatus, SharedState};
use crate::error::PoolError;

/// Default pause between two health checks.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on waiting for a stopped task.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing knobs of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub monitor_interval: Duration,
    pub join_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Point-in-time view of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusReport {
    pub running: bool,
    pub status: AgentStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub last_change: Option<DateTime<Utc>>,
    pub retries: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub healthy: bool,
}

/// An agent that has exhausted its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnhealthyAgent {
    pub name: String,
    pub retries: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
}

/// Result of one health check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<UnhealthyAgent>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

struct AgentEntry {
    agent: Arc<Mutex<Agent>>,
    state: SharedState,
    enabled: bool,
    task: Option<RunningTask>,
}

/// The set of agents of one mission.
pub struct AgentPool {
    entries: BTreeMap<String, AgentEntry>,
    root: CancellationToken,
    monitor: Option<RunningTask>,
    abandoned: Vec<String>,
    settings: PoolSettings,
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("agents", &self.entries.keys().collect::<Vec<_>>())
            .field("monitor", &self.monitor.is_some())
            .field("abandoned", &self.abandoned)
            .field("settings", &self.settings)
            .finish()
    }
}

impl AgentPool {
    /// Build one agent per spec. Nothing is started.
    pub fn new(
        specs: &[AgentSpec],
        options: &AgentOptions,
        settings: PoolSettings,
    ) -> Result<Self, PoolError> {
        let mut entries = BTreeMap::new();
        for spec in specs {
            if entries.contains_key(&spec.name) {
                return Err(PoolError::DuplicateAgent(spec.name.clone()));
            }
            let agent = Agent::new(spec, options);
            let state = agent.state();
            entries.insert(
                spec.name.clone(),
                AgentEntry {
                    agent: Arc::new(Mutex::new(agent)),
                    state,
                    enabled: spec.enabled,
                    task: None,
                },
            );
        }

        Ok(Self {
            entries,
            root: CancellationToken::new(),
            monitor: None,
            abandoned: Vec::new(),
            settings,
        })
    }

    /// Names of every registered agent, sorted.
    pub fn agent_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Check whether an agent's task is alive.
    pub fn is_running(&self, name: &str) -> Result<bool, PoolError> {
        let entry = self.entry(name)?;
        Ok(entry.task.as_ref().is_some_and(RunningTask::is_running))
    }

    /// Start every enabled agent and the monitor. Returns how many agents
    /// were started by this call.
    pub fn start_all(&mut self) -> usize {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, _)| name.clone())
            .collect();

        let started = names
            .iter()
            .filter(|name| self.start(name).unwrap_or(false))
            .count();
        info!(started, total = self.entries.len(), "✓ Agent pool started");
        started
    }

    /// Start one agent. Returns `false` if it was already running.
    pub fn start(&mut self, name: &str) -> Result<bool, PoolError> {
        let token = self.root.child_token();
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PoolError::UnknownAgent(name.to_string()))?;
        if entry.task.as_ref().is_some_and(RunningTask::is_running) {
            return Ok(false);
        }

        let agent = entry.agent.clone();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let mut agent = agent.lock_owned().await;
            agent.run(child).await;
        });
        entry.task = Some(RunningTask { token, handle });
        debug!(agent = name, "Agent task spawned");

        self.ensure_monitor();
        Ok(true)
    }

    /// Stop one agent. Returns `false` if it was not running.
    pub async fn stop(&mut self, name: &str) -> Result<bool, PoolError> {
        let join_timeout = self.settings.join_timeout;
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PoolError::UnknownAgent(name.to_string()))?;
        let Some(task) = entry.task.take() else {
            return Ok(false);
        };

        let was_running = task.is_running();
        task.token.cancel();
        if !join_bounded(name, task.handle, join_timeout).await {
            self.abandoned.push(name.to_string());
        }
        if !self.any_running() {
            self.stop_monitor().await;
        }
        Ok(was_running)
    }

    /// Stop every agent and the monitor.
    ///
    /// All tokens are cancelled first, then each task is joined with the
    /// join timeout. Bookkeeping is cleared whatever the outcome, and
    /// [`abandoned`](Self::abandoned) restarts from this shutdown.
    pub async fn stop_all(&mut self) {
        let join_timeout = self.settings.join_timeout;
        self.abandoned.clear();
        let tasks: Vec<(String, RunningTask)> = self
            .entries
            .iter_mut()
            .filter_map(|(name, entry)| entry.task.take().map(|t| (name.clone(), t)))
            .collect();

        for (_, task) in &tasks {
            task.token.cancel();
        }
        for (name, task) in tasks {
            if !join_bounded(&name, task.handle, join_timeout).await {
                self.abandoned.push(name);
            }
        }
        self.stop_monitor().await;
        info!(abandoned = self.abandoned.len(), "Agent pool stopped");
    }

    /// Start the agent if it is stopped, stop it if it is running.
    /// Returns whether it is running afterwards.
    pub async fn toggle(&mut self, name: &str) -> Result<bool, PoolError> {
        if self.is_running(name)? {
            self.stop(name).await?;
            Ok(false)
        } else {
            self.start(name)?;
            Ok(true)
        }
    }

    /// Snapshot of every agent.
    pub fn status(&self) -> BTreeMap<String, AgentStatusReport> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let state = entry.state.snapshot();
                let report = AgentStatusReport {
                    running: entry.task.as_ref().is_some_and(RunningTask::is_running),
                    status: state.status,
                    last_run: state.last_run,
                    last_change: state.last_change,
                    retries: state.retries,
                    max_retries: state.max_retries,
                    healthy: state.is_healthy(),
                    error_message: state.error_message,
                };
                (name.clone(), report)
            })
            .collect()
    }

    /// Which agents are within their retry budget.
    pub fn health_report(&self) -> HealthReport {
        let states: Vec<SharedState> = self.entries.values().map(|e| e.state.clone()).collect();
        health_report(&states)
    }

    /// Agents whose task did not stop within the join timeout since the
    /// last [`stop_all`](Self::stop_all).
    pub fn abandoned(&self) -> &[String] {
        &self.abandoned
    }

    fn entry(&self, name: &str) -> Result<&AgentEntry, PoolError> {
        self.entries
            .get(name)
            .ok_or_else(|| PoolError::UnknownAgent(name.to_string()))
    }

    fn any_running(&self) -> bool {
        self.entries
            .values()
            .any(|e| e.task.as_ref().is_some_and(RunningTask::is_running))
    }

    fn ensure_monitor(&mut self) {
        if self.monitor.as_ref().is_some_and(RunningTask::is_running) {
            return;
        }
        let token = self.root.child_token();
        let states: Vec<SharedState> = self.entries.values().map(|e| e.state.clone()).collect();
        let interval = self.settings.monitor_interval;
        let child = token.clone();
        let handle = tokio::spawn(async move { monitor(states, interval, child).await });
        self.monitor = Some(RunningTask { token, handle });
    }

    async fn stop_monitor(&mut self) {
        if let Some(task) = self.monitor.take() {
            task.token.cancel();
            join_bounded("monitor", task.handle, self.settings.join_timeout).await;
        }
    }
}

impl Drop for AgentPool {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Wait for `handle` up to `timeout`, aborting it on expiry.
/// Returns whether the task finished on its own.
async fn join_bounded(name: &str, mut handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(agent = name, error = %e, "⚠ Agent task ended abnormally");
            true
        }
        Err(_) => {
            handle.abort();
            warn!(agent = name, timeout_ms = timeout.as_millis() as u64, "⚠ Agent task abandoned");
            false
        }
    }
}

fn health_report(states: &[SharedState]) -> HealthReport {
    let mut report = HealthReport::default();
    for state in states {
        let state = state.snapshot();
        if state.is_healthy() {
            report.healthy.push(state.name);
        } else {
            report.unhealthy.push(UnhealthyAgent {
                name: state.name,
                retries: state.retries,
                max_retries: state.max_retries,
                error_message: state.error_message,
            });
        }
    }
    report
}

async fn monitor(states: Vec<SharedState>, interval: Duration, token: CancellationToken) {
    debug!(interval_ms = interval.as_millis() as u64, "Health monitor started");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let report = health_report(&states);
        for agent in &report.unhealthy {
            warn!(
                agent = %agent.name,
                retries = agent.retries,
                max_retries = agent.max_retries,
                error = agent.error_message.as_deref().unwrap_or(""),
                "⚠ Agent unhealthy"
            );
        }
        debug!(
            healthy = report.healthy.len(),
            unhealthy = report.unhealthy.len(),
            "Health check"
        );
    }
    debug!("Health monitor stopped");
}
