// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors reported by `tetherctl`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] tether::Error),

    #[error("invalid JSON for {what}: {source}\n  hint: quote the value, e.g. '{{\"key\":\"value\"}}'")]
    InvalidJson {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("invalid argument '{0}'\n  hint: use KEY=VALUE")]
    InvalidArgument(String),

    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("subscription ended")]
    SubscriptionEnded,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
