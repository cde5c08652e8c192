// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tether-core operations.

use thiserror::Error;

/// All possible errors that can occur while decoding wire frames.
#[derive(Debug, Error)]
pub enum Error {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("invalid session state: '{0}'")]
    InvalidState(String),
}

/// A specialized Result type for tether-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
