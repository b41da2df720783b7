// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A model that replays canned replies.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProposalError;

use super::LanguageModel;

/// Replays a fixed script of replies in order.
///
/// Once the script is exhausted the last reply is repeated. Every prompt is
/// recorded so callers can inspect what was asked.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ProposalError>>>,
    last: Mutex<Option<Result<String, ProposalError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = Result<String, ProposalError>>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A model that always answers `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        Self::new([Ok(reply.into())])
    }

    /// A model that always fails with `error`.
    pub fn failing(error: ProposalError) -> Self {
        Self::new([Err(error)])
    }

    /// Wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn next_reply(&self) -> Result<String, ProposalError> {
        let mut last = lock(&self.last);
        if let Some(reply) = lock(&self.script).pop_front() {
            *last = Some(reply.clone());
            return reply;
        }
        last.clone().unwrap_or_else(|| {
            Err(ProposalError::NotConfigured("script is empty".to_string()))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, ProposalError> {
        lock(&self.prompts).push(prompt.to_string());
        if !self.delay.is_zero() {
            if self.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ProposalError::Timeout(timeout));
            }
            tokio::time::sleep(self.delay).await;
        }
        self.next_reply()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_replays_in_order_then_repeats_last() {
        let model = ScriptedModel::new([Ok("one".to_string()), Ok("two".to_string())]);
        assert_eq!(model.generate("a", LONG).await.unwrap(), "one");
        assert_eq!(model.generate("b", LONG).await.unwrap(), "two");
        assert_eq!(model.generate("c", LONG).await.unwrap(), "two");
        assert_eq!(model.calls(), 3);
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_script() {
        let model = ScriptedModel::default();
        assert!(matches!(
            model.generate("a", LONG).await,
            Err(ProposalError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_delay_longer_than_timeout() {
        let model = ScriptedModel::always("late").with_delay(Duration::from_secs(10));
        let err = model.generate("a", Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, ProposalError::Timeout(Duration::from_millis(20)));
    }
}
