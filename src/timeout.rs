// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hard wall-clock deadlines for calls that may hang.
//!
//! Any request to an external collaborator (the language model in
//! particular) runs through a [`TimeoutGuard`] so a stalled connection costs
//! the calling agent one bounded wait instead of its whole task.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

/// The guarded operation did not finish before its deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{label} timed out after {after:?}")]
pub struct TimeoutError {
    /// What was being waited on.
    pub label: String,
    /// The deadline that was exceeded.
    pub after: Duration,
}

/// Runs futures under a fixed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutGuard {
    deadline: Duration,
}

impl TimeoutGuard {
    /// Create a guard with the given deadline.
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// The configured deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `operation`, failing with [`TimeoutError`] if it outlives the deadline.
    ///
    /// On expiry the future is dropped, which cancels it at its next await
    /// point.
    pub async fn run<F, T>(&self, label: &str, operation: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        with_deadline(self.deadline, label, operation).await
    }
}

/// Run `operation` under a one-off deadline.
pub async fn with_deadline<F, T>(
    deadline: Duration,
    label: &str,
    operation: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    match tokio::time::timeout(deadline, operation).await {
        Ok(value) => Ok(value),
        Err(_) => {
            warn!(operation = label, elapsed_ms = start.elapsed().as_millis() as u64, "Deadline exceeded");
            Err(TimeoutError {
                label: label.to_string(),
                after: deadline,
            })
        }
    }
}
