// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lpd: LPD spooling server. Runs until Ctrl-C.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use lpd_app::cli::LpdArgs;
use lpd_core::error::Result;
use lpd_protocol::listener::LpdServer;
use lpd_protocol::spool::FileSpool;

#[tokio::main]
async fn main() -> ExitCode {
    lpd_app::init_logging();
    let args = LpdArgs::parse();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "lpd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &LpdArgs) -> Result<()> {
    let config = args.server_config()?;

    if !config.queue_folder.is_dir() {
        warn!(
            queue_folder = %config.queue_folder.display(),
            "queue folder does not exist, every queue will be reported missing"
        );
    }

    let spool = FileSpool::from_config(&config);
    let mut server = LpdServer::new(config, spool);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    server.stop().await
}
