// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hidden `zerg worker` entry point: runs the worker protocol from the
//! `ZERG_*` environment the launcher injected.

use anyhow::Result;
use zerg_core::ExitCode;
use zerg_engine::WorkerProtocol;

pub async fn run() -> Result<i32> {
    let mut protocol = WorkerProtocol::from_env()?;
    match protocol.run().await {
        Ok(exit) => Ok(exit.code()),
        Err(err) => {
            eprintln!("worker failed: {err:#}");
            Ok(ExitCode::Error.code())
        }
    }
}
