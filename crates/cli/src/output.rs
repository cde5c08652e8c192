// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Rendering of results for stdout.

use serde_json::{json, Value};
use tether::{Notification, TokenValidity};

use crate::cli::OutputFormat;

pub fn format_value(value: &Value, format: OutputFormat) -> String {
    let rendered = match format {
        OutputFormat::Text => serde_json::to_string_pretty(value),
        OutputFormat::Json => serde_json::to_string(value),
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

pub fn format_notification(notification: &Notification, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(notification).unwrap_or_default(),
        OutputFormat::Text => format!(
            "{}:{} {}",
            notification.controller,
            notification.action,
            format_value(&notification.result, OutputFormat::Json)
        ),
    }
}

pub fn format_validity(validity: &TokenValidity, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!({
            "valid": validity.valid,
            "state": validity.state,
            "expiresAt": validity.expires_at.map(|at| at.to_rfc3339()),
        })
        .to_string(),
        OutputFormat::Text if validity.valid => match validity.expires_at {
            Some(at) => format!("valid until {}", at.to_rfc3339()),
            None => "valid".to_string(),
        },
        OutputFormat::Text => {
            format!("invalid: {}", validity.state.as_deref().unwrap_or("unknown reason"))
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
