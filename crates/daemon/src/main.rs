// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sfd`: the Stemflow orchestrator daemon.
//!
//! Usage: `sfd [config.toml]`

use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    match sf_daemon::run(config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sfd: {}", e);
            ExitCode::FAILURE
        }
    }
}
