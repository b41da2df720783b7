// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and metrics.
//!
//! - **Logging**: `tracing` events with structured fields (`agent`,
//!   `document`, `section`), rendered by `tracing-subscriber`
//! - **Metrics**: in-process operation latencies and counters, gated behind
//!   the `telemetry` feature at the call sites
//!
//! Initialize once at startup:
//!
//! ```rust,ignore
//! use concord::telemetry::{init_telemetry, LogSettings};
//!
//! let _guard = init_telemetry(&LogSettings::from_verbosity(0))?;
//! ```
//!
//! Log lines for outcomes carry a leading symbol: `✓` success, `⚠` warning,
//! `✗` error.

mod init;
pub mod metrics;

pub use init::{init_telemetry, LogSettings, TelemetryGuard};
pub use metrics::{Histogram, Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS};
