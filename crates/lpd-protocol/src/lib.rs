// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LPD protocol: RFC 1179 client and server engines, the queue backend
// contract, a file-system spool backend and the TCP listener.  Types and
// errors shared with the binaries live in `lpd-core`.

pub mod client;
pub mod framing;
pub mod hook;
pub mod listener;
pub mod queue;
pub mod retry;
pub mod server;
pub mod spool;

pub use client::{ClientProtocol, TcpClient, connect};
pub use hook::{JobHook, ScriptHook};
pub use listener::LpdServer;
pub use queue::{PayloadSource, PrintJobQueue, QueueBackend};
pub use retry::{RetryConfig, RetryDecision, classify_error, should_retry, with_retry};
pub use server::ServerProtocol;
pub use spool::{FileSpool, SpoolSession};
