// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn defaults() {
    let options = SessionOptions::default();
    assert!(!options.auto_queue);
    assert!(options.auto_reconnect);
    assert!(!options.auto_replay);
    assert!(options.auto_resubscribe);
    assert_eq!(options.queue_max_size, 500);
    assert_eq!(options.queue_ttl_ms, 120_000);
    assert_eq!(options.replay_interval(), Duration::from_millis(10));
    assert_eq!(options.reconnection_delay_ms, 1000);
    assert_eq!(options.max_reconnect_attempts, 0);
    assert_eq!(options.request_history_ttl_ms, 10_000);
    assert_eq!(options.offline_mode, OfflineMode::Manual);
}

#[test]
fn empty_file_gives_defaults() {
    let file = write_config("");
    let options = SessionOptions::load(file.path()).unwrap();
    assert_eq!(options.queue_max_size, 500);
    assert!(options.auto_reconnect);
}

#[test]
fn load_partial_file() {
    let file = write_config(
        r#"
auto_queue = true
queue_max_size = 3
default_index = "shop"

[headers]
tenant = "acme"

[volatile]
app = "cli"
"#,
    );
    let options = SessionOptions::load(file.path()).unwrap();

    assert!(options.auto_queue);
    assert!(!options.auto_replay);
    assert_eq!(options.queue_max_size, 3);
    assert_eq!(options.default_index.as_deref(), Some("shop"));
    assert_eq!(options.headers.get("tenant"), Some(&json!("acme")));
    assert_eq!(options.volatile.get("app"), Some(&json!("cli")));
}

#[test]
fn auto_offline_mode_forces_flags() {
    let file = write_config(
        r#"
offline_mode = "auto"
auto_queue = false
auto_resubscribe = false
"#,
    );
    let options = SessionOptions::load(file.path()).unwrap();

    assert!(options.auto_queue);
    assert!(options.auto_reconnect);
    assert!(options.auto_replay);
    assert!(options.auto_resubscribe);
}

#[test]
fn missing_file_is_config_error() {
    let err = SessionOptions::load(Path::new("/nonexistent/tether.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("failed to read")));
}

#[test]
fn invalid_toml_is_config_error() {
    let file = write_config("queue_max_size = \"many\"");
    let err = SessionOptions::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("failed to parse")));
}

#[test]
fn query_options_builder() {
    let options = QueryOptions::new()
        .not_queuable()
        .with_request_id("r1")
        .with_refresh("wait_for")
        .with_volatile("origin", json!("test"))
        .with_arg("size", json!(5));

    assert!(!options.queuable);
    assert_eq!(options.request_id.as_deref(), Some("r1"));
    assert_eq!(options.refresh.as_deref(), Some("wait_for"));
    assert_eq!(options.volatile.get("origin"), Some(&json!("test")));
    assert_eq!(options.args.get("size"), Some(&json!(5)));
    assert!(QueryOptions::default().queuable);
}
