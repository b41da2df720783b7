// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! [`WorkspaceConfig`] is what a single file may contain: every field is
//! optional. [`ResolvedConfig`] is the result of merging all sources over the
//! defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::{default_agents, AgentOptions, AgentSpec};
use crate::cache::TtlCache;
use crate::error::ConfigError;
use crate::llm::{ModelSettings, SharedModel, OPENAI_BASE_URL};
use crate::pool::PoolSettings;
use crate::store::{validate_name, DocumentStore, StoreOptions};

/// Model endpoint settings as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Contents of one configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Directory holding the missions, relative to the workspace root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missions_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    /// Pause between two cycles of an agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_interval_secs: Option<u64>,

    /// Bound on one model call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_timeout_secs: Option<u64>,

    /// Bound on acquiring a document lock
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,

    /// Age after which a lock file is considered abandoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_lock_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_interval_secs: Option<u64>,

    /// Bound on waiting for an agent task to stop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_timeout_secs: Option<u64>,

    /// Consecutive failed cycles before an agent is reported unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Lifetime of cached model replies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    /// Agents to run; replaces the default set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentSpec>>,
}

/// Model endpoint settings after merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for ResolvedProviderConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

/// Fully merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub missions_dir: PathBuf,
    pub provider: ResolvedProviderConfig,
    pub cycle_interval_secs: u64,
    pub llm_timeout_secs: u64,
    pub lock_timeout_secs: u64,
    pub stale_lock_secs: u64,
    pub monitor_interval_secs: u64,
    pub join_timeout_secs: u64,
    pub max_retries: u32,
    pub cache_ttl_secs: u64,
    pub agents: Vec<AgentSpec>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            missions_dir: PathBuf::from("missions"),
            provider: ResolvedProviderConfig::default(),
            cycle_interval_secs: 30,
            llm_timeout_secs: 120,
            lock_timeout_secs: 10,
            stale_lock_secs: 60,
            monitor_interval_secs: 30,
            join_timeout_secs: 5,
            max_retries: 3,
            cache_ttl_secs: 600,
            agents: default_agents(),
        }
    }
}

impl ResolvedConfig {
    /// Check the values that cannot be expressed by types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("cycleIntervalSecs", self.cycle_interval_secs),
            ("llmTimeoutSecs", self.llm_timeout_secs),
            ("lockTimeoutSecs", self.lock_timeout_secs),
            ("staleLockSecs", self.stale_lock_secs),
            ("monitorIntervalSecs", self.monitor_interval_secs),
            ("joinTimeoutSecs", self.join_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        // A live lock held for the full wait must never look abandoned.
        if self.stale_lock_secs <= self.lock_timeout_secs {
            return Err(invalid("staleLockSecs", "must be greater than lockTimeoutSecs"));
        }
        if self.max_retries == 0 {
            return Err(invalid("maxRetries", "must be greater than zero"));
        }
        if self.provider.model.trim().is_empty() {
            return Err(invalid("provider.model", "must not be empty"));
        }
        if let Some(t) = self.provider.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid("provider.temperature", "must be between 0 and 2"));
            }
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if !names.insert(agent.name.as_str()) {
                return Err(invalid("agents", &format!("duplicate agent '{}'", agent.name)));
            }
            validate_name(&agent.name)
                .map_err(|e| invalid("agents", &e.to_string()))?;
            validate_name(agent.primary())
                .map_err(|e| invalid("agents", &format!("{}: {e}", agent.name)))?;
            for watched in agent.watched() {
                validate_name(&watched)
                    .map_err(|e| invalid("agents", &format!("{}: {e}", agent.name)))?;
            }
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_lock_timeout(Duration::from_secs(self.lock_timeout_secs))
            .with_stale_lock_after(Duration::from_secs(self.stale_lock_secs))
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            monitor_interval: Duration::from_secs(self.monitor_interval_secs),
            join_timeout: Duration::from_secs(self.join_timeout_secs),
        }
    }

    /// Shared agent options over `store` and `model`.
    pub fn agent_options(&self, store: Arc<DocumentStore>, model: SharedModel) -> AgentOptions {
        AgentOptions::new(store, model)
            .with_cache(Arc::new(TtlCache::with_ttl(Duration::from_secs(
                self.cache_ttl_secs,
            ))))
            .with_llm_timeout(Duration::from_secs(self.llm_timeout_secs))
            .with_interval(Duration::from_secs(self.cycle_interval_secs))
            .with_max_retries(self.max_retries)
    }

    /// Model settings, with the API key read from the environment.
    pub fn model_settings(&self) -> ModelSettings {
        let api_key = self
            .provider
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        ModelSettings::new(&self.provider.base_url, &self.provider.model)
            .with_api_key(api_key)
            .with_max_tokens(self.provider.max_tokens)
            .with_temperature(self.provider.temperature)
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RoleKind;

    #[test]
    fn test_defaults() {
        let config = ResolvedConfig::default();
        assert_eq!(config.cycle_interval_secs, 30);
        assert_eq!(config.llm_timeout_secs, 120);
        assert_eq!(config.lock_timeout_secs, 10);
        assert_eq!(config.monitor_interval_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.cache_ttl_secs, 600);
        assert_eq!(config.agents.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workspace_config_parse_json() {
        let json = r#"{
            "missionsDir": "work",
            "provider": {"baseUrl": "http://localhost:11434/v1", "model": "llama3.2"},
            "cycleIntervalSecs": 5,
            "agents": [{"name": "writer", "role": "production"}]
        }"#;
        let config: WorkspaceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.missions_dir.as_deref(), Some("work"));
        assert_eq!(
            config.provider.as_ref().and_then(|p| p.model.as_deref()),
            Some("llama3.2")
        );
        assert_eq!(config.cycle_interval_secs, Some(5));
        assert_eq!(config.agents.unwrap()[0].role, RoleKind::Production);
    }

    #[test]
    fn test_workspace_config_parse_yaml() {
        let yaml = "maxRetries: 5\nprovider:\n  model: mistral\n  temperature: 0.2\n";
        let config: WorkspaceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_retries, Some(5));
        assert_eq!(config.provider.unwrap().temperature, Some(0.2));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = ResolvedConfig {
            cycle_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "cycleIntervalSecs"
        ));
    }

    #[test]
    fn test_validate_rejects_short_stale_lock_age() {
        let config = ResolvedConfig {
            stale_lock_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "staleLockSecs"
        ));

        let config = ResolvedConfig {
            lock_timeout_secs: 30,
            stale_lock_secs: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_and_bad_names() {
        let mut config = ResolvedConfig::default();
        config.agents.push(AgentSpec::for_role(RoleKind::Production));
        assert!(config.validate().is_err());

        let mut config = ResolvedConfig::default();
        let mut spec = AgentSpec::for_role(RoleKind::Evaluation);
        spec.name = "critic".to_string();
        spec.primary = Some("../escape".to_string());
        config.agents = vec![spec];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = ResolvedConfig {
            lock_timeout_secs: 2,
            join_timeout_secs: 1,
            ..Default::default()
        };
        assert_eq!(config.store_options().lock_timeout, Duration::from_secs(2));
        assert_eq!(config.pool_settings().join_timeout, Duration::from_secs(1));

        let settings = ResolvedConfig {
            provider: ResolvedProviderConfig {
                api_key_env: Some("CONCORD_TEST_UNSET_KEY_VAR".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
        .model_settings();
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.model, "gpt-4o-mini");
    }
}
