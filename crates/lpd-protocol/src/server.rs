// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LPD server protocol engine (RFC 1179 sections 5 and 6).
//
// One `ServerProtocol` handles one connection.  It reads exactly one
// top-level command, dispatches it to the queue backend, and for
// receive-job enters the sub-command loop:
//
// ```text
// Idle -> DispatchTop -> Done                    (commands 1, 3, 4, 5)
// Idle -> DispatchTop -> SubCommandLoop -> Done  (command 2)
// ```
//
// The sub-command loop ends when the client closes its write side.  The
// caller closes the connection after `handle` returns, which is also the
// end marker of a queue-state response.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use lpd_core::error::{LpdError, Result};
use lpd_core::types::{Ack, Charset, Command, SubCommand};

use crate::framing::{read_byte, read_line, split_job_list, split_operands, write_ack};
use crate::queue::PrintJobQueue;

/// Server side of one LPD connection.
pub struct ServerProtocol<R, W, Q> {
    reader: R,
    writer: W,
    queue: Q,
    charset: Charset,
}

impl<R, W, Q> ServerProtocol<R, W, Q>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    Q: PrintJobQueue,
{
    pub fn new(reader: R, writer: W, queue: Q) -> Self {
        Self {
            reader,
            writer,
            queue,
            charset: Charset::default(),
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn into_parts(self) -> (R, W, Q) {
        (self.reader, self.writer, self.queue)
    }

    /// Read and execute one top-level command.
    ///
    /// # Errors
    ///
    /// [`LpdError::Protocol`] for an unknown command or sub-command byte, a
    /// missing operand, a non-numeric byte count or a bad payload terminator.
    /// Backend and I/O errors are passed through.  Nothing is retried.
    pub async fn handle(&mut self) -> Result<()> {
        let byte = read_byte(&mut self.reader)
            .await?
            .ok_or_else(|| LpdError::Protocol("connection closed before a command".into()))?;

        let command = Command::from_byte(byte)
            .ok_or_else(|| LpdError::Protocol(format!("unsupported command: {byte}")))?;
        debug!(?command, "command received");

        match command {
            Command::PrintWaitingJobs => self.print_any_waiting_jobs().await,
            Command::ReceiveJob => {
                self.receive_a_printer_job().await?;
                self.sub_command_loop().await?;
                self.queue.finished_receiving_a_printer_job().await
            }
            Command::QueueStateShort => self.send_queue_state(false).await,
            Command::QueueStateLong => self.send_queue_state(true).await,
            Command::RemoveJobs => self.remove_jobs().await,
        }
    }

    // +----+-------+----+
    // | 01 | Queue | LF |
    // +----+-------+----+
    async fn print_any_waiting_jobs(&mut self) -> Result<()> {
        let queue = read_line(&mut self.reader, self.charset).await?;
        info!(queue = %queue, "print any waiting jobs");
        self.queue.print_any_waiting_jobs(&queue).await
    }

    // +----+-------+----+
    // | 02 | Queue | LF |
    // +----+-------+----+
    async fn receive_a_printer_job(&mut self) -> Result<()> {
        let queue = read_line(&mut self.reader, self.charset).await?;
        let ack = self.queue.receive_a_printer_job(&queue).await?;
        if ack.is_success() {
            info!(queue = %queue, "receiving print job");
        } else {
            warn!(queue = %queue, code = ack.byte(), "receive job refused by queue");
        }
        write_ack(&mut self.writer, ack).await
    }

    async fn sub_command_loop(&mut self) -> Result<()> {
        while let Some(byte) = read_byte(&mut self.reader).await? {
            let sub_command = SubCommand::from_byte(byte)
                .ok_or_else(|| LpdError::Protocol(format!("unsupported sub-command: {byte}")))?;
            debug!(?sub_command, "sub-command received");

            match sub_command {
                SubCommand::AbortJob => {
                    // +----+----+
                    // | 01 | LF |
                    // +----+----+
                    read_line(&mut self.reader, self.charset).await?;
                    info!("job aborted by client");
                    self.queue.abort_job().await?;
                }
                SubCommand::ReceiveControlFile | SubCommand::ReceiveDataFile => {
                    self.receive_file(sub_command).await?;
                }
            }
        }
        debug!("sub-command phase closed by client");
        Ok(())
    }

    // +----+-------+----+------+----+
    // | 02 | Count | SP | Name | LF |   control file
    // | 03 | Count | SP | Name | LF |   data file
    // +----+-------+----+------+----+
    //
    // ack, Count payload bytes, 0x00 from the client, ack.
    async fn receive_file(&mut self, kind: SubCommand) -> Result<()> {
        let line = read_line(&mut self.reader, self.charset).await?;
        let (count, name) = parse_file_header(&line)?;

        write_ack(&mut self.writer, Ack::SUCCESS).await?;

        let source = &mut self.reader;
        let ack = match kind {
            SubCommand::ReceiveControlFile => {
                self.queue.receive_control_file(count, &name, source).await?
            }
            _ => self.queue.receive_data_file(count, &name, source).await?,
        };

        match read_byte(&mut self.reader).await? {
            Some(0) => {}
            Some(other) => {
                return Err(LpdError::Protocol(format!(
                    "invalid payload terminator {other} after {name}"
                )));
            }
            None => {
                return Err(LpdError::Protocol(format!(
                    "connection closed before payload terminator of {name}"
                )));
            }
        }

        debug!(file = %name, count, code = ack.byte(), "file received");
        write_ack(&mut self.writer, ack).await
    }

    // +----+-------+----+------+----+
    // | 03 | Queue | SP | List | LF |
    // | 04 | Queue | SP | List | LF |
    // +----+-------+----+------+----+
    async fn send_queue_state(&mut self, long: bool) -> Result<()> {
        let line = read_line(&mut self.reader, self.charset).await?;
        let operands = split_operands(&line);
        let (queue, rest) = operands
            .split_first()
            .ok_or_else(|| LpdError::Protocol("queue state without a queue name".into()))?;
        let jobs = job_list(rest);

        let state = if long {
            self.queue.send_queue_state_long(queue, jobs.as_deref()).await?
        } else {
            self.queue.send_queue_state_short(queue, jobs.as_deref()).await?
        };

        debug!(queue = %queue, long, bytes = state.len(), "sending queue state");
        self.writer.write_all(&self.charset.encode(&state)).await?;
        self.writer.flush().await?;
        Ok(())
    }

    // +----+-------+----+-------+----+------+----+
    // | 05 | Queue | SP | Agent | SP | List | LF |
    // +----+-------+----+-------+----+------+----+
    async fn remove_jobs(&mut self) -> Result<()> {
        let line = read_line(&mut self.reader, self.charset).await?;
        let operands = split_operands(&line);
        let [queue, agent, rest @ ..] = operands.as_slice() else {
            return Err(LpdError::Protocol(format!(
                "remove jobs needs a queue and an agent, got {line:?}"
            )));
        };
        let jobs = job_list(rest);

        info!(queue = %queue, agent = %agent, jobs = ?jobs, "remove jobs");
        self.queue.remove_jobs(queue, agent, jobs.as_deref()).await
    }
}

/// Parse `Count SP Name`.
fn parse_file_header(line: &str) -> Result<(u64, String)> {
    let mut operands = line.split_whitespace();
    let count = operands
        .next()
        .ok_or_else(|| LpdError::Protocol("file header without a byte count".into()))?;
    let count = count
        .parse::<u64>()
        .map_err(|_| LpdError::Protocol(format!("invalid byte count: {count:?}")))?;
    let name = operands
        .next()
        .ok_or_else(|| LpdError::Protocol("file header without a file name".into()))?;
    Ok((count, name.to_string()))
}

fn job_list(operands: &[&str]) -> Option<Vec<String>> {
    if operands.is_empty() {
        None
    } else {
        Some(split_job_list(operands.iter().copied()))
    }
}
