// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// HTTP stack crates that are noisy below `warn`.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2"];

/// How agent logs are filtered and rendered on stderr.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Level for concord itself when no explicit filter is given.
    pub level: Level,
    /// Add targets, source locations and span timings to each line.
    pub detailed: bool,
    pub ansi: bool,
    /// Explicit filter directive; wins over `RUST_LOG`.
    pub filter: Option<String>,
}

impl LogSettings {
    /// Map a `-v` count to settings: 0 info, 1 debug, 2+ trace.
    ///
    /// Detailed lines are switched on from debug up, where interleaved
    /// agent cycles are hard to follow without targets and span timings.
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            detailed: verbose > 0,
            ansi: io::stderr().is_terminal(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Directive used when neither `filter` nor `RUST_LOG` is set.
    fn default_directive(&self) -> String {
        let mut directive = self.level.to_string().to_lowercase();
        for name in QUIET_DEPENDENCIES {
            directive.push_str(&format!(",{name}=warn"));
        }
        directive
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_directive());
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::from_verbosity(0)
    }
}

/// Keeps the subscriber installed. Hold it for the life of the program.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(settings: &LogSettings) -> io::Result<TelemetryGuard> {
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(settings.ansi);

    let registry = tracing_subscriber::registry().with(settings.env_filter());
    let installed = if settings.detailed {
        registry
            .with(
                layer
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry.with(layer.with_target(false).compact()).try_init()
    };
    installed.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
