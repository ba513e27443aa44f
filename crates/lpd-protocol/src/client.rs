// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LPR/LPD client protocol engine (RFC 1179).
//
// Issues the five daemon commands and, for job submission, the control-file
// and data-file sub-commands with both levels of acknowledgement.  The
// engine is generic over the transport so it can run on a TCP stream or on
// in-memory buffers.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

use lpd_core::config::ClientConfig;
use lpd_core::error::{LpdError, Result};
use lpd_core::types::{
    Charset, Command, CONTROL_FILE_PREFIX, DATA_FILE_PREFIX, JOB_NUMBER_PLACEHOLDER, LF,
    SubCommand,
};

use crate::framing::{expect_ack, read_until_close, write_command_line};

/// Default client host written into control files.
pub const DEFAULT_CLIENT_HOST: &str = "LOCALHOST";

/// Chunk size for streaming file payloads.
const TRANSFER_CHUNK: usize = 4096;

/// Client side of one LPD connection.
pub struct ClientProtocol<R, W> {
    reader: R,
    writer: W,
    charset: Charset,
    client_host: String,
    user: Option<String>,
    send_data_first: bool,
}

/// A client connected over TCP.
pub type TcpClient = ClientProtocol<BufReader<OwnedReadHalf>, OwnedWriteHalf>;

/// Connect to the server named in `config`, with its connect timeout.
pub async fn connect(config: &ClientConfig) -> Result<TcpClient> {
    let addr = format!("{}:{}", config.host, config.port);
    info!(addr = %addr, "connecting to LPD server");

    let stream = tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        TcpStream::connect(&addr),
    )
    .await
    .map_err(|_| {
        LpdError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "connection to {addr} timed out after {}s",
                config.connect_timeout_secs
            ),
        ))
    })??;

    let (reader, writer) = stream.into_split();
    Ok(ClientProtocol::from_config(BufReader::new(reader), writer, config))
}

impl<R, W> ClientProtocol<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            charset: Charset::default(),
            client_host: DEFAULT_CLIENT_HOST.into(),
            user: None,
            send_data_first: false,
        }
    }

    pub fn from_config(reader: R, writer: W, config: &ClientConfig) -> Self {
        Self {
            reader,
            writer,
            charset: config.charset,
            client_host: config.client_host.clone(),
            user: config.user.clone(),
            send_data_first: config.send_data_first,
        }
    }

    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    pub fn set_client_host(&mut self, client_host: impl Into<String>) {
        self.client_host = client_host.into();
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    pub fn set_send_data_first(&mut self, send_data_first: bool) {
        self.send_data_first = send_data_first;
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Close the write side so the server sees end of stream.
    pub async fn finish(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Command 1: start printing whatever is waiting in `queue`.
    pub async fn print_queue(&mut self, queue: &str) -> Result<()> {
        write_command_line(
            &mut self.writer,
            Command::PrintWaitingJobs.code(),
            &[queue],
            self.charset,
        )
        .await
    }

    /// Command 2 with a generated control file (`H`, `J`, `N` and, when a
    /// user is configured, `P` lines).
    pub async fn send_file<D>(
        &mut self,
        queue: &str,
        name: &str,
        data: D,
        data_size: u64,
    ) -> Result<()>
    where
        D: AsyncRead + Unpin,
    {
        let control = self.control_file(name);
        let control_size = control.len() as u64;
        self.send_file_with_control(queue, data, data_size, control.as_slice(), control_size)
            .await
    }

    /// Command 2 with a caller-supplied control file.
    ///
    /// Sub-command order follows `send_data_first`.  A source that yields
    /// fewer bytes than declared makes the client send the abort sub-command
    /// and return [`LpdError::ShortTransfer`]; the connection is unusable
    /// afterwards.
    pub async fn send_file_with_control<D, C>(
        &mut self,
        queue: &str,
        data: D,
        data_size: u64,
        control: C,
        control_size: u64,
    ) -> Result<()>
    where
        D: AsyncRead + Unpin,
        C: AsyncRead + Unpin,
    {
        write_command_line(
            &mut self.writer,
            Command::ReceiveJob.code(),
            &[queue],
            self.charset,
        )
        .await?;
        expect_ack(&mut self.reader, "receive job").await?;

        if self.send_data_first {
            self.send_sub_file(SubCommand::ReceiveDataFile, data, data_size).await?;
            self.send_sub_file(SubCommand::ReceiveControlFile, control, control_size)
                .await?;
        } else {
            self.send_sub_file(SubCommand::ReceiveControlFile, control, control_size)
                .await?;
            self.send_sub_file(SubCommand::ReceiveDataFile, data, data_size).await?;
        }

        info!(queue, data_size, "print job sent");
        Ok(())
    }

    /// Command 3: short queue listing.
    pub async fn get_short_queue_state(&mut self, queue: &str, jobs: Option<&str>) -> Result<String> {
        self.queue_state(Command::QueueStateShort, queue, jobs).await
    }

    /// Command 4: long queue listing.
    pub async fn get_long_queue_state(&mut self, queue: &str, jobs: Option<&str>) -> Result<String> {
        self.queue_state(Command::QueueStateLong, queue, jobs).await
    }

    /// Command 5: remove jobs as the configured user.
    pub async fn remove_jobs(&mut self, queue: &str, jobs: Option<&str>) -> Result<()> {
        let user = self
            .user
            .as_deref()
            .ok_or_else(|| LpdError::Config("remove jobs requires a user (agent)".into()))?;

        let mut operands = vec![queue, user];
        operands.extend(jobs);
        write_command_line(
            &mut self.writer,
            Command::RemoveJobs.code(),
            &operands,
            self.charset,
        )
        .await
    }

    async fn queue_state(&mut self, command: Command, queue: &str, jobs: Option<&str>) -> Result<String> {
        let mut operands = vec![queue];
        operands.extend(jobs);
        write_command_line(&mut self.writer, command.code(), &operands, self.charset).await?;

        // No length and no terminator: the server closing the stream ends it.
        let response = read_until_close(&mut self.reader).await?;
        debug!(?command, bytes = response.len(), "queue state received");
        Ok(self.charset.decode(&response))
    }

    fn control_file(&self, name: &str) -> Vec<u8> {
        let mut lines = format!("H{}\nJ{name}\nN{name}\n", self.client_host);
        if let Some(user) = &self.user {
            lines.push_str(&format!("P{user}\n"));
        }
        self.charset.encode(&lines)
    }

    fn file_name(&self, kind: SubCommand) -> String {
        let prefix = match kind {
            SubCommand::ReceiveControlFile => CONTROL_FILE_PREFIX,
            _ => DATA_FILE_PREFIX,
        };
        format!("{prefix}{JOB_NUMBER_PLACEHOLDER}{}", self.client_host)
    }

    // +----+-------+----+------+----+
    // | 02 | Count | SP | Name | LF |  ack  payload  0x00  ack
    // +----+-------+----+------+----+
    async fn send_sub_file<S>(&mut self, kind: SubCommand, mut source: S, size: u64) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        let name = self.file_name(kind);
        let count = size.to_string();
        let operands = [count.as_str(), name.as_str()];
        write_command_line(&mut self.writer, kind.code(), &operands, self.charset).await?;
        expect_ack(&mut self.reader, "file header").await?;

        let sent = self.stream_payload(&mut source, size).await?;
        self.writer.write_all(&[0]).await?;
        self.writer.flush().await?;

        // RFC 1179 section 6: the payload is framed by the declared count, so
        // the server is still waiting for the missing bytes and its second ack
        // would never come. Do not read it here. The caller has to drop the
        // connection.
        if sent != size {
            warn!(file = %name, declared = size, sent, "source ended early, aborting job");
            self.abort_print_job().await?;
            return Err(LpdError::ShortTransfer {
                expected: size,
                actual: sent,
            });
        }
        expect_ack(&mut self.reader, "file payload").await?;

        debug!(file = %name, bytes = sent, "file sent");
        Ok(())
    }

    /// Copy at most `size` bytes from `source`; stops early if it runs dry.
    async fn stream_payload<S>(&mut self, source: &mut S, size: u64) -> Result<u64>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut sent = 0u64;
        while sent < size {
            let want = (size - sent).min(TRANSFER_CHUNK as u64) as usize;
            let read = source.read(&mut buf[..want]).await?;
            if read == 0 {
                break;
            }
            self.writer.write_all(&buf[..read]).await?;
            sent += read as u64;
        }
        Ok(sent)
    }

    // +----+----+
    // | 01 | LF |
    // +----+----+
    async fn abort_print_job(&mut self) -> Result<()> {
        self.writer
            .write_all(&[SubCommand::AbortJob.code(), LF])
            .await?;
        self.writer.flush().await?;
        Ok(())
    }
}
