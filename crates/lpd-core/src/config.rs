// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client and server configuration, loadable from TOML.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LpdError, Result};
use crate::types::{Charset, LPD_PORT};

/// Settings for the `lpr` client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port (default 515).
    pub port: u16,
    /// Queue used when none is given on the command line.
    pub queue: String,
    /// Operand and response encoding.
    pub charset: Charset,
    /// Host written into the control file and the cf/df file names.
    pub client_host: String,
    /// User for the control file `P` line and the remove-jobs agent.
    pub user: Option<String>,
    /// Send the data file before the control file.
    pub send_data_first: bool,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: LPD_PORT,
            queue: "RAW".into(),
            charset: Charset::Ascii,
            client_host: "LOCALHOST".into(),
            user: None,
            send_data_first: false,
            connect_timeout_secs: 60,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path.as_ref())
    }
}

/// External post-processing command run for each completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Argument template; `$1` is replaced by the queue name and `$2` by the
    /// absolute job folder path.
    #[serde(default = "default_script_args")]
    pub args: Vec<String>,
}

impl ScriptConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: default_script_args(),
        }
    }
}

fn default_script_args() -> Vec<String> {
    vec!["$1".into(), "$2".into()]
}

/// Settings for the `lpd` server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind (default 515).
    pub port: u16,
    /// Root folder holding one sub-folder per queue.
    pub queue_folder: PathBuf,
    /// Hook invoked per received job and per job on print-waiting-jobs.
    pub script: Option<ScriptConfig>,
    /// Listen backlog.
    pub socket_backlog_size: u32,
    /// Maximum number of connections handled concurrently.
    pub client_connection_threads: usize,
    /// Operand and response encoding.
    pub charset: Charset,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: LPD_PORT,
            queue_folder: PathBuf::from("work/queues"),
            script: None,
            socket_backlog_size: 100,
            client_connection_threads: 8,
            charset: Charset::Ascii,
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_toml(path.as_ref())?;
        if config.client_connection_threads == 0 {
            return Err(LpdError::Config(
                "client_connection_threads must be at least 1".into(),
            ));
        }
        Ok(config)
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LpdError::Config(format!("read {}: {e}", path.display())))?;
    toml::from_str(&text).map_err(|e| LpdError::Config(format!("parse {}: {e}", path.display())))
}
