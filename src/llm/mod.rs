// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Language model backends.
//!
//! Agents treat the model as an opaque `generate(prompt, timeout) -> text`
//! collaborator:
//!
//! - [`OpenAiCompatibleModel`] - any `/chat/completions` endpoint (OpenAI,
//!   Ollama, Groq, ...)
//! - [`ScriptedModel`] - replays canned replies, for tests and offline runs
//!
//! # Example
//!
//! ```rust,ignore
//! use concord::llm::{LanguageModel, OpenAiCompatibleModel, ModelSettings};
//!
//! let model = OpenAiCompatibleModel::new(ModelSettings::ollama("llama3.2"))?;
//! let reply = model.generate("Summarise the request", Duration::from_secs(60)).await?;
//! ```

mod openai;
mod scripted;

pub use openai::{ModelSettings, OpenAiCompatibleModel, OLLAMA_BASE_URL, OPENAI_BASE_URL};
pub use scripted::ScriptedModel;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProposalError;

/// A text generator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply to `prompt`, giving up after `timeout`.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProposalError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

/// Shared handle to a model.
pub type SharedModel = Arc<dyn LanguageModel>;
