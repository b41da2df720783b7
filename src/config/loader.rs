// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! Handles loading configuration from JSON and YAML files in various locations.

use std::path::{Path, PathBuf};

use crate::agent::{AgentSpec, RoleKind};
use crate::error::ConfigError;

use super::types::{ProviderConfig, WorkspaceConfig};

/// Config file names to search for (in order).
pub const CONFIG_FILES: &[&str] = &["concord.json", ".concord/config.json", "concord.yaml"];

/// Local config file name (personal overrides, not committed).
pub const LOCAL_CONFIG_FILE: &str = "concord.local.json";

/// Global config directory name.
pub const GLOBAL_CONFIG_DIR: &str = ".concord";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Get the global config directory path.
pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

/// Get the global config file path.
pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Load global configuration from ~/.concord/config.json.
pub fn load_global_config() -> Result<Option<WorkspaceConfig>, ConfigError> {
    match get_global_config_path() {
        Some(path) => load_optional(&path),
        None => Ok(None),
    }
}

/// Load workspace configuration from the first of [`CONFIG_FILES`] present.
pub fn load_workspace_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    for filename in CONFIG_FILES {
        let path = workspace_root.join(filename);
        if path.exists() {
            return load_config_file(&path).map(Some);
        }
    }
    Ok(None)
}

/// Load local configuration from concord.local.json.
pub fn load_local_config(workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    load_optional(&workspace_root.join(LOCAL_CONFIG_FILE))
}

fn load_optional(path: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(path).map(Some)
}

/// Load a configuration file (JSON or YAML, by extension).
pub fn load_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        "json" | "" => serde_json::from_str(&content).map_err(ConfigError::from),
        other => Err(ConfigError::InvalidFormat(format!(
            "unsupported config extension '.{other}' ({})",
            path.display()
        ))),
    }
}

/// Save workspace configuration as pretty JSON.
pub fn save_workspace_config(
    workspace_root: &Path,
    config: &WorkspaceConfig,
    filename: Option<&str>,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(filename.unwrap_or(CONFIG_FILES[0]));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Write a config file, refusing to overwrite an existing one.
pub fn init_config(
    workspace_root: &Path,
    config: Option<WorkspaceConfig>,
) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(CONFIG_FILES[0]);
    if path.exists() {
        return Err(ConfigError::InvalidValue {
            field: CONFIG_FILES[0].to_string(),
            message: format!("{} already exists", path.display()),
        });
    }
    save_workspace_config(workspace_root, &config.unwrap_or_else(get_example_config), None)
}

/// Find the workspace root by searching upwards for a config file.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| CONFIG_FILES.iter().any(|f| dir.join(f).exists()))
        .map(Path::to_path_buf)
}

/// A commented-by-example starting configuration.
pub fn get_example_config() -> WorkspaceConfig {
    WorkspaceConfig {
        missions_dir: Some("missions".to_string()),
        provider: Some(ProviderConfig {
            base_url: Some(crate::llm::OLLAMA_BASE_URL.to_string()),
            model: Some("llama3.2".to_string()),
            api_key_env: None,
            max_tokens: Some(4096),
            temperature: Some(0.3),
        }),
        cycle_interval_secs: Some(30),
        llm_timeout_secs: Some(120),
        max_retries: Some(3),
        agents: Some(RoleKind::ALL.iter().map(|r| AgentSpec::for_role(*r)).collect()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_global_config_dir() {
        let dir = get_global_config_dir().unwrap();
        assert!(dir.ends_with(".concord"));
    }

    #[test]
    fn test_load_workspace_config_not_found() {
        let temp = TempDir::new().unwrap();
        assert!(load_workspace_config(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_workspace_config_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("concord.json"),
            r#"{"provider": {"model": "gpt-4o"}, "maxRetries": 4}"#,
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.provider.unwrap().model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.max_retries, Some(4));
    }

    #[test]
    fn test_load_workspace_config_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("concord.yaml"),
            "cycleIntervalSecs: 7\nagents:\n  - name: critic\n    role: evaluation\n",
        )
        .unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.cycle_interval_secs, Some(7));
        assert_eq!(config.agents.unwrap()[0].name, "critic");
    }

    #[test]
    fn test_json_wins_over_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("concord.json"), r#"{"maxRetries": 1}"#).unwrap();
        std::fs::write(temp.path().join("concord.yaml"), "maxRetries: 9\n").unwrap();

        let config = load_workspace_config(temp.path()).unwrap().unwrap();
        assert_eq!(config.max_retries, Some(1));
    }

    #[test]
    fn test_invalid_json_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("concord.json"), "{not json").unwrap();
        assert!(matches!(
            load_workspace_config(temp.path()),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "x = 1").unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_init_config_and_refuse_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = init_config(temp.path(), None).unwrap();
        assert_eq!(path.file_name().unwrap(), "concord.json");

        let saved = load_config_file(&path).unwrap();
        assert_eq!(saved, get_example_config());
        assert!(init_config(temp.path(), None).is_err());
    }

    #[test]
    fn test_find_workspace_root() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("a").join("b");
        std::fs::create_dir_all(&subdir).unwrap();
        std::fs::create_dir_all(temp.path().join(".concord")).unwrap();
        std::fs::write(temp.path().join(".concord/config.json"), "{}").unwrap();

        assert_eq!(find_workspace_root(&subdir).unwrap(), temp.path());
    }
}
