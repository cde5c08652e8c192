// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tether::{QueryOptions, Session, Target};

use super::{parse_arg, parse_json};
use crate::cli::{OutputFormat, QueryArgs};
use crate::error::Result;
use crate::output;

/// Builds the target and options a `query` command line describes.
pub(crate) fn prepare(args: &QueryArgs) -> Result<(Target, serde_json::Value, QueryOptions)> {
    let mut target = Target::new(args.controller.as_str(), args.action.as_str());
    if let Some(index) = &args.index {
        target = target.with_index(index.as_str());
    }
    if let Some(collection) = &args.collection {
        target = target.with_collection(collection.as_str());
    }

    let body = parse_json("--body", &args.body)?;
    let mut options = QueryOptions::new().not_queuable();
    for arg in &args.args {
        let (key, value) = parse_arg(arg)?;
        options = options.with_arg(key, value);
    }
    if let Some(refresh) = &args.refresh {
        options = options.with_refresh(refresh.as_str());
    }
    Ok((target, body, options))
}

pub async fn run(session: &Session, args: QueryArgs, format: OutputFormat) -> Result<()> {
    let (target, body, options) = prepare(&args)?;
    let response = session.query(target, body, options)?.await?;
    println!("{}", output::format_value(response.result(), format));
    Ok(())
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
