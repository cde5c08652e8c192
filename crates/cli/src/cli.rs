// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for results and notifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Text,
    /// One compact JSON document per line.
    Json,
}

const QUICKSTART_HELP: &str = "\
Examples:
  tetherctl query server now
  tetherctl query document get -i shop -c items --body '{\"_id\":\"42\"}'
  tetherctl subscribe shop items --filters '{\"equals\":{\"color\":\"red\"}}'
  tetherctl check-token <token>";

#[derive(Parser, Debug)]
#[command(name = "tetherctl")]
#[command(about = "Command-line client for a realtime document backend")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Backend WebSocket URL
    #[arg(long, global = true, env = "TETHER_URL", default_value = "ws://localhost:7512")]
    pub url: String,

    /// Session options file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Authentication token to use for requests
    #[arg(long, global = true, env = "TETHER_JWT", hide_env_values = true)]
    pub jwt: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value_t)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request and print its result
    Query(QueryArgs),

    /// Subscribe to a collection and print notifications
    Subscribe(SubscribeArgs),

    /// Check whether a token is valid
    #[command(name = "check-token")]
    CheckToken {
        /// Token to check
        token: String,
    },
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// API controller
    pub controller: String,

    /// Controller action
    pub action: String,

    /// Target index
    #[arg(short, long)]
    pub index: Option<String>,

    /// Target collection
    #[arg(short, long)]
    pub collection: Option<String>,

    /// Request body (JSON)
    #[arg(short, long, default_value = "{}")]
    pub body: String,

    /// Extra top-level argument, KEY=VALUE (repeatable; VALUE may be JSON)
    #[arg(short, long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    /// Refresh policy for write actions
    #[arg(long)]
    pub refresh: Option<String>,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Index to watch
    pub index: String,

    /// Collection to watch
    pub collection: String,

    /// Subscription filters (JSON)
    #[arg(short, long, default_value = "{}")]
    pub filters: String,

    /// Document scope: in, out, all or none
    #[arg(long, default_value = "all")]
    pub scope: String,

    /// User presence notifications: in, out, all or none
    #[arg(long, default_value = "none")]
    pub users: String,

    /// Skip notifications caused by this client
    #[arg(long)]
    pub skip_self: bool,

    /// Exit after this many notifications
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}
