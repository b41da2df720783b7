// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for concord.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.concord/config.json
//! - Workspace config: concord.json, .concord/config.json, or concord.yaml
//! - Local config: concord.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    find_workspace_root, get_example_config, get_global_config_dir, get_global_config_path,
    init_config, load_config_file, load_global_config, load_local_config, load_workspace_config,
    save_workspace_config, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{ProviderConfig, ResolvedConfig, ResolvedProviderConfig, WorkspaceConfig};

use crate::error::ConfigError;
use std::path::Path;

/// Load, merge and validate all configuration sources for a workspace.
///
/// A relative `missions_dir` is resolved against `workspace_root`.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = load_global_config()?;
    let workspace = load_workspace_config(workspace_root)?;
    let local = load_local_config(workspace_root)?;

    let mut config = merge_config(global, workspace, local, cli_options);
    if config.missions_dir.is_relative() {
        config.missions_dir = workspace_root.join(&config.missions_dir);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), CliOptions::default()).unwrap();

        // A global config may exist on the host; only the path resolution is fixed.
        assert!(config.missions_dir.starts_with(temp.path()) || config.missions_dir.is_absolute());
    }

    #[test]
    fn test_load_config_with_workspace_and_local() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("concord.json"),
            r#"{"missionsDir": "docs", "provider": {"model": "gpt-4o"}, "maxRetries": 5}"#,
        )
        .unwrap();
        std::fs::write(
            temp.path().join("concord.local.json"),
            r#"{"maxRetries": 2}"#,
        )
        .unwrap();

        let config = load_config(temp.path(), CliOptions::default()).unwrap();

        assert_eq!(config.missions_dir, temp.path().join("docs"));
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_load_config_cli_override() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("concord.json"),
            r#"{"provider": {"model": "gpt-4o"}}"#,
        )
        .unwrap();

        let cli = CliOptions {
            model: Some("llama3.2".to_string()),
            ..Default::default()
        };

        let config = load_config(temp.path(), cli).unwrap();
        assert_eq!(config.provider.model, "llama3.2");
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("concord.json"),
            r#"{"llmTimeoutSecs": 0}"#,
        )
        .unwrap();

        assert!(matches!(
            load_config(temp.path(), CliOptions::default()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_config_rejects_zero_stale_lock_age() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("concord.json"), r#"{"staleLockSecs": 0}"#).unwrap();

        assert!(matches!(
            load_config(temp.path(), CliOptions::default()),
            Err(ConfigError::InvalidValue { field, .. }) if field == "staleLockSecs"
        ));
    }
}
