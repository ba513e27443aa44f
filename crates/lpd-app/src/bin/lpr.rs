// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lpr: send one command to an LPD server.

use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};

use lpd_app::cli::{LprArgs, LprCommand};
use lpd_core::config::ClientConfig;
use lpd_core::error::{LpdError, Result};
use lpd_protocol::client::connect;
use lpd_protocol::retry::{RetryConfig, with_retry};

#[tokio::main]
async fn main() -> ExitCode {
    lpd_app::init_logging();
    let args = LprArgs::parse();

    let config = match args.client_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid options");
            return ExitCode::FAILURE;
        }
    };

    let retry = RetryConfig {
        max_retries: args.retries,
        ..Default::default()
    };

    match with_retry(&retry, || run(&args, &config)).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, cmd = ?args.cmd, "lpr failed");
            ExitCode::FAILURE
        }
    }
}

/// One attempt on a fresh connection. Returns the text to print.
async fn run(args: &LprArgs, config: &ClientConfig) -> Result<String> {
    let queue = config.queue.as_str();
    let jobs = args.jobs.as_deref();
    let mut client = connect(config).await?;

    let output = match args.cmd {
        LprCommand::Print => {
            client.print_queue(queue).await?;
            "Printed.".to_string()
        }
        LprCommand::Send => {
            let path = args
                .file
                .as_deref()
                .ok_or_else(|| LpdError::Config("send requires --file".into()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| LpdError::Config(format!("{} is not a file", path.display())))?;
            let file = tokio::fs::File::open(path).await?;
            let size = file.metadata().await?.len();

            client
                .send_file(queue, &name, BufReader::new(file), size)
                .await?;
            info!(queue, file = %path.display(), bytes = size, "job submitted");
            "Sent.".to_string()
        }
        LprCommand::State => {
            let state = client.get_short_queue_state(queue, jobs).await?;
            format!("State:\n{state}")
        }
        LprCommand::Lstate => {
            let state = client.get_long_queue_state(queue, jobs).await?;
            format!("LState:\n{state}")
        }
        LprCommand::Remove => {
            client.remove_jobs(queue, jobs).await?;
            "Removed.".to_string()
        }
    };

    client.finish().await?;
    Ok(output)
}
