// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for concord.
//!
//! This module provides strongly-typed errors for the different layers of the
//! system, using `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation at the binary edge.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while obtaining or interpreting a model proposal.
///
/// Every variant is treated by an agent cycle as "no change proposed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),
}

impl ProposalError {
    /// Check if this failure should count against the agent's retry budget.
    ///
    /// A malformed response is the model misbehaving, not the transport, so it
    /// only produces a warning.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, Self::MalformedResponse(_))
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors that can occur while accessing documents on disk.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid document name: {0}")]
    InvalidName(String),

    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    #[error("Mission already exists: {0}")]
    MissionExists(String),

    #[error("Timed out after {timeout:?} waiting for lock on {document}")]
    LockTimeout { document: String, timeout: Duration },

    #[error("Mutation rejected on {document}: {message}")]
    MutationRejected { document: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Check if this is a lock acquisition timeout.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

impl From<tempfile::PersistError> for StoreError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that can occur while managing the agent pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_error_counts_as_failure() {
        assert!(ProposalError::RequestFailed("503".to_string()).counts_as_failure());
        assert!(ProposalError::Timeout(Duration::from_secs(1)).counts_as_failure());
        assert!(ProposalError::NotConfigured("no key".to_string()).counts_as_failure());
        assert!(!ProposalError::MalformedResponse("no headings".to_string()).counts_as_failure());
    }

    #[test]
    fn test_store_error_lock_timeout() {
        let err = StoreError::LockTimeout {
            document: "management".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(err.is_lock_timeout());
        assert!(err.to_string().contains("management"));

        let io: StoreError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(!io.is_lock_timeout());
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));
    }
}
