// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{ProviderConfig, ResolvedConfig, ResolvedProviderConfig, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub missions_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub interval_secs: Option<u64>,
    pub llm_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (concord.local.json)
/// 3. Workspace config (concord.json)
/// 4. Global config (~/.concord/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref dir) = config.missions_dir {
        result.missions_dir = PathBuf::from(dir);
    }

    if let Some(ref provider) = config.provider {
        apply_provider(&mut result.provider, provider);
    }

    let durations = [
        (&mut result.cycle_interval_secs, config.cycle_interval_secs),
        (&mut result.llm_timeout_secs, config.llm_timeout_secs),
        (&mut result.lock_timeout_secs, config.lock_timeout_secs),
        (&mut result.stale_lock_secs, config.stale_lock_secs),
        (&mut result.monitor_interval_secs, config.monitor_interval_secs),
        (&mut result.join_timeout_secs, config.join_timeout_secs),
        (&mut result.cache_ttl_secs, config.cache_ttl_secs),
    ];
    for (slot, value) in durations {
        if let Some(value) = value {
            *slot = value;
        }
    }

    if let Some(retries) = config.max_retries {
        result.max_retries = retries;
    }

    // A list of agents is a whole roster, never merged entry by entry.
    if let Some(ref agents) = config.agents {
        result.agents = agents.clone();
    }
}

fn apply_provider(result: &mut ResolvedProviderConfig, provider: &ProviderConfig) {
    if let Some(ref base_url) = provider.base_url {
        result.base_url = base_url.clone();
    }
    if let Some(ref model) = provider.model {
        result.model = model.clone();
    }
    if provider.api_key_env.is_some() {
        result.api_key_env = provider.api_key_env.clone();
    }
    if let Some(max_tokens) = provider.max_tokens {
        result.max_tokens = max_tokens;
    }
    if provider.temperature.is_some() {
        result.temperature = provider.temperature;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(ref dir) = cli.missions_dir {
        result.missions_dir = dir.clone();
    }
    if let Some(ref base_url) = cli.base_url {
        result.provider.base_url = base_url.clone();
    }
    if let Some(ref model) = cli.model {
        result.provider.model = model.clone();
    }
    if cli.api_key_env.is_some() {
        result.provider.api_key_env = cli.api_key_env.clone();
    }
    if let Some(secs) = cli.interval_secs {
        result.cycle_interval_secs = secs;
    }
    if let Some(secs) = cli.llm_timeout_secs {
        result.llm_timeout_secs = secs;
    }
    if let Some(retries) = cli.max_retries {
        result.max_retries = retries;
    }
}
