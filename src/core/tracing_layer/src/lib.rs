/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/core/tracing_layer/src/lib.rs
*
* Installs the global `tracing` subscriber. The verbosity comes from
* `RUST_LOG` (default `info`) and the output is either JSON lines, which is
* what the scheduled container task ships to its log group, or a pretty
* human-readable form for local runs. Logs go to stderr; stdout is left to
* the binary's own output.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer,
};

/// Output format of the log stream.
///
/// Parses from `json`, `pretty` or `text` (an alias of `pretty`), so it can
/// be used directly as a CLI/environment value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => f.write_str("json"),
            LogFormat::Pretty => f.write_str("pretty"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Builds the filter from `RUST_LOG`, falling back to `default_directive`.
fn build_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initializes the global subscriber and sets it as the default.
///
/// Returns an error if a subscriber was already installed, which callers are
/// free to ignore (tests install their own).
pub fn init(format: LogFormat) -> Result<(), TryInitError> {
    let filter = build_filter("info");

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
}
