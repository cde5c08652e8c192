// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod check_token;
pub mod query;
pub mod subscribe;

use serde_json::Value;

use crate::error::{Error, Result};

/// Parses a JSON command-line value.
pub(crate) fn parse_json(what: &'static str, input: &str) -> Result<Value> {
    serde_json::from_str(input).map_err(|source| Error::InvalidJson { what, source })
}

/// Parses `KEY=VALUE`; the value is read as JSON when it parses, else as a
/// string.
pub(crate) fn parse_arg(input: &str) -> Result<(String, Value)> {
    let (key, value) = input
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| Error::InvalidArgument(input.to_string()))?;
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
