// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Post-processing hooks run by the file spool for completed jobs.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use lpd_core::config::ScriptConfig;
use lpd_core::error::{LpdError, Result};

/// Something to do with a job folder once it is complete, or when a client
/// asks for waiting jobs to be printed.
#[async_trait]
pub trait JobHook: Send + Sync {
    /// Handle the job stored in `job_path` (absolute) of `queue`. Returns the
    /// hook's textual output.
    async fn run(&self, queue: &str, job_path: &Path) -> Result<String>;
}

/// Runs an external program once per job.
///
/// Each argument of the template has `$1` replaced by the queue name and `$2`
/// by the job folder path. Arguments are passed as-is, without a shell.
#[derive(Debug, Clone)]
pub struct ScriptHook {
    config: ScriptConfig,
}

impl ScriptHook {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    fn expand_args(&self, queue: &str, job_path: &Path) -> Vec<String> {
        let job_path = job_path.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| arg.replace("$1", queue).replace("$2", &job_path))
            .collect()
    }
}

#[async_trait]
impl JobHook for ScriptHook {
    async fn run(&self, queue: &str, job_path: &Path) -> Result<String> {
        let args = self.expand_args(queue, job_path);
        debug!(program = %self.config.program.display(), ?args, "running job script");

        let output = Command::new(&self.config.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LpdError::Hook(format!("{}: {e}", self.config.program.display()))
            })?;

        if !output.status.success() {
            warn!(
                program = %self.config.program.display(),
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "job script exited with failure"
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
