// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line options. Flags override values loaded from `--config`, which
// in turn override the built-in defaults.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use lpd_core::config::{ClientConfig, ScriptConfig, ServerConfig};
use lpd_core::error::{LpdError, Result};
use lpd_core::types::Charset;

/// What `lpr` should ask the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LprCommand {
    /// Print any waiting jobs in the queue.
    Print,
    /// Submit `--file` as a new print job.
    Send,
    /// Short queue listing.
    State,
    /// Long queue listing.
    Lstate,
    /// Remove `--jobs` from the queue as `--agent`.
    Remove,
}

/// LPD (RFC 1179) client.
#[derive(Parser, Debug)]
#[command(name = "lpr", author, version, about, long_about = None)]
pub struct LprArgs {
    #[arg(long, value_enum, ignore_case = true)]
    pub cmd: LprCommand,

    /// Server host name or address.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub queue: Option<String>,

    /// File to print (`send`). Its base name becomes the job name.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// User recorded in the control file and used for `remove`.
    #[arg(long)]
    pub agent: Option<String>,

    /// Job list for `state`, `lstate` and `remove`, e.g. `1406-0,1406-1`.
    #[arg(long)]
    pub jobs: Option<String>,

    /// Send the data file before the control file.
    #[arg(long)]
    pub datafirst: bool,

    /// Operand encoding: ascii, iso-8859-1 or utf-8.
    #[arg(long)]
    pub charset: Option<Charset>,

    /// TOML file with client settings.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Retries on connection failures.
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

impl LprArgs {
    /// Merge the flags into the configuration file (or the defaults) and
    /// check the per-command requirements.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(queue) = &self.queue {
            config.queue = queue.clone();
        }
        if let Some(agent) = &self.agent {
            config.user = Some(agent.clone());
        }
        if let Some(charset) = self.charset {
            config.charset = charset;
        }
        config.send_data_first |= self.datafirst;

        match self.cmd {
            LprCommand::Send if self.file.is_none() => {
                Err(LpdError::Config("send requires --file".into()))
            }
            LprCommand::Remove if config.user.is_none() => {
                Err(LpdError::Config("remove requires --agent".into()))
            }
            _ => Ok(config),
        }
    }
}

/// LPD (RFC 1179) spooling server.
#[derive(Parser, Debug)]
#[command(name = "lpd", author, version, about, long_about = None)]
pub struct LpdArgs {
    /// Address to bind.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Program run per received job and per job on `print`, with the queue
    /// name and the job folder as arguments.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Argument template for `--script`; `$1` is the queue, `$2` the job
    /// folder. Repeat for several arguments.
    #[arg(long = "script-arg", requires = "script", allow_hyphen_values = true)]
    pub script_args: Vec<String>,

    /// Folder holding one sub-folder per queue.
    #[arg(long)]
    pub queuefolder: Option<PathBuf>,

    #[arg(long)]
    pub socketbacklogsize: Option<u32>,

    /// Maximum number of connections handled at once.
    #[arg(long = "clientConnectionThreads", alias = "clientconnectionthreads")]
    pub client_connection_threads: Option<usize>,

    /// Operand and response encoding: ascii, iso-8859-1 or utf-8.
    #[arg(long)]
    pub charset: Option<Charset>,

    /// TOML file with server settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl LpdArgs {
    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(program) = &self.script {
            let mut script = ScriptConfig::new(program);
            if !self.script_args.is_empty() {
                script.args = self.script_args.clone();
            }
            config.script = Some(script);
        }
        if let Some(folder) = &self.queuefolder {
            config.queue_folder = folder.clone();
        }
        if let Some(backlog) = self.socketbacklogsize {
            config.socket_backlog_size = backlog;
        }
        if let Some(threads) = self.client_connection_threads {
            if threads == 0 {
                return Err(LpdError::Config(
                    "--clientConnectionThreads must be at least 1".into(),
                ));
            }
            config.client_connection_threads = threads;
        }
        if let Some(charset) = self.charset {
            config.charset = charset;
        }
        Ok(config)
    }
}
