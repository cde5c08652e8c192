// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tetherctl - command-line client built on the `tether` session engine.
//!
//! Each invocation opens a session, runs one command and disconnects:
//!
//! - `query` sends a single request and prints its result
//! - `subscribe` streams the notifications of a room until interrupted
//! - `check-token` reports whether a token is still valid

mod cli;
mod commands;
mod output;

pub mod error;
pub mod logging;

pub use cli::{Cli, Command, OutputFormat, QueryArgs, SubscribeArgs};
pub use error::{Error, Result};

use tether::{Session, SessionOptions};
use tracing::debug;

/// Runs a parsed command line against the backend.
pub async fn run(cli: Cli) -> Result<()> {
    let options = match &cli.config {
        Some(path) => SessionOptions::load(path)?,
        None => SessionOptions::default(),
    };

    let session = Session::builder(options).websocket(cli.url.as_str()).build()?;
    debug!(url = %cli.url, "connecting");
    session.connect()?.await?;
    if let Some(jwt) = cli.jwt {
        session.set_jwt(jwt);
    }

    let result = match cli.command {
        Command::Query(args) => commands::query::run(&session, args, cli.output).await,
        Command::Subscribe(args) => commands::subscribe::run(&session, args, cli.output).await,
        Command::CheckToken { token } => {
            commands::check_token::run(&session, &token, cli.output).await
        }
    };

    session.disconnect();
    result
}
