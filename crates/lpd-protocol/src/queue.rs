// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue backend contract.
//
// The server engine knows nothing about storage.  It translates each command
// into a call on a `PrintJobQueue`, and writes the returned result codes as
// acknowledgement bytes.  One `PrintJobQueue` value serves exactly one
// connection; a `QueueBackend` hands out those per-connection sessions and is
// the only thing shared between connections.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use lpd_core::error::Result;
use lpd_core::types::Ack;

/// Byte source handed to a backend for a file payload.
pub type PayloadSource<'a> = &'a mut (dyn AsyncRead + Unpin + Send);

/// Per-connection print job queue session.
///
/// Operations with a result-code slot on the wire (`receive_a_printer_job`,
/// `receive_control_file`, `receive_data_file`) report backend failures as a
/// non-zero [`Ack`].  An `Err` from any operation is fatal for the connection.
#[async_trait]
pub trait PrintJobQueue: Send {
    /// Start printing whatever is waiting in `queue`.
    async fn print_any_waiting_jobs(&mut self, queue: &str) -> Result<()>;

    /// Open a job submission session for `queue`.
    ///
    /// A non-zero code does not stop the engine from running the sub-command
    /// loop; the backend is expected to reject the sub-commands that follow.
    async fn receive_a_printer_job(&mut self, queue: &str) -> Result<Ack>;

    /// Short queue listing, written to the client verbatim.
    async fn send_queue_state_short(&mut self, queue: &str, jobs: Option<&[String]>)
        -> Result<String>;

    /// Long queue listing, written to the client verbatim.
    async fn send_queue_state_long(&mut self, queue: &str, jobs: Option<&[String]>)
        -> Result<String>;

    /// Remove the listed jobs on behalf of `agent`.
    async fn remove_jobs(&mut self, queue: &str, agent: &str, jobs: Option<&[String]>)
        -> Result<()>;

    /// Discard everything received for the current job. A no-op when no job
    /// is in progress.
    async fn abort_job(&mut self) -> Result<()>;

    /// Store a control file of `count` bytes read from `source`.
    ///
    /// Must consume exactly `count` bytes, or fewer only when `source` ends
    /// early; detecting that truncation is the backend's job.
    async fn receive_control_file(
        &mut self,
        count: u64,
        name: &str,
        source: PayloadSource<'_>,
    ) -> Result<Ack>;

    /// Store a data file of `count` bytes read from `source`. Same contract
    /// as [`receive_control_file`](Self::receive_control_file).
    async fn receive_data_file(
        &mut self,
        count: u64,
        name: &str,
        source: PayloadSource<'_>,
    ) -> Result<Ack>;

    /// The client closed the sub-command phase of a receive-job command.
    async fn finished_receiving_a_printer_job(&mut self) -> Result<()>;
}

/// Shared backend that opens one [`PrintJobQueue`] session per connection.
pub trait QueueBackend: Send + Sync + 'static {
    type Session: PrintJobQueue + 'static;

    fn session(&self) -> Self::Session;
}
