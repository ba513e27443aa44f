// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the LPD client, server and spool.

use thiserror::Error;

/// Top-level error type for all LPD operations.
#[derive(Debug, Error)]
pub enum LpdError {
    // -- Protocol errors --
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected end of stream: expected {expected} byte, received {received}")]
    UnexpectedEof { expected: usize, received: usize },

    #[error("received negative acknowledgement {code} after {stage}")]
    Nack { stage: &'static str, code: u8 },

    #[error("short transfer: declared {expected} byte, sent {actual}")]
    ShortTransfer { expected: u64, actual: u64 },

    // -- Backend errors --
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("file already exists in print job folder: {0}")]
    FileExists(String),

    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("job hook failed: {0}")]
    Hook(String),

    // -- Configuration --
    #[error("configuration error: {0}")]
    Config(String),

    // -- Transport --
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LpdError {
    /// Malformed frame, unexpected byte, early end of stream or a refused ack.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::UnexpectedEof { .. } | Self::Nack { .. }
        )
    }

    /// Raised by a queue backend rather than by the wire protocol.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::InvalidFileName(_)
                | Self::FileExists(_)
                | Self::Backend(_)
                | Self::Hook(_)
        )
    }

    /// Underlying connection failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LpdError>;
