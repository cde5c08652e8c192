// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use tether::Session;

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::output;

pub async fn run(session: &Session, token: &str, format: OutputFormat) -> Result<()> {
    let validity = session.check_token(token).await?;
    println!("{}", output::format_validity(&validity, format));
    Ok(())
}
