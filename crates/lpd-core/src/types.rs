// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire-level domain types shared by the LPD client and server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LpdError;

/// Default LPD port (RFC 1179).
pub const LPD_PORT: u16 = 515;

/// Line terminator for every command and sub-command line.
pub const LF: u8 = 0x0A;

/// Operand separator.
pub const SP: u8 = b' ';

/// Prefix of a control file name (`cfA` + job number + host).
pub const CONTROL_FILE_PREFIX: &str = "cfA";

/// Prefix of a data file name (`dfA` + job number + host).
pub const DATA_FILE_PREFIX: &str = "dfA";

/// Job number field written by the client. Never incremented.
pub const JOB_NUMBER_PLACEHOLDER: &str = "000";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Top-level daemon commands (RFC 1179 section 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// `01 Queue LF`
    PrintWaitingJobs = 1,
    /// `02 Queue LF` followed by the sub-command loop.
    ReceiveJob = 2,
    /// `03 Queue SP List LF`
    QueueStateShort = 3,
    /// `04 Queue SP List LF`
    QueueStateLong = 4,
    /// `05 Queue SP Agent SP List LF`
    RemoveJobs = 5,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::PrintWaitingJobs),
            2 => Some(Self::ReceiveJob),
            3 => Some(Self::QueueStateShort),
            4 => Some(Self::QueueStateLong),
            5 => Some(Self::RemoveJobs),
            _ => None,
        }
    }
}

/// Second-level commands, valid only inside a `ReceiveJob` session
/// (RFC 1179 section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubCommand {
    /// `01 LF`
    AbortJob = 1,
    /// `02 Count SP Name LF`
    ReceiveControlFile = 2,
    /// `03 Count SP Name LF`
    ReceiveDataFile = 3,
}

impl SubCommand {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::AbortJob),
            2 => Some(Self::ReceiveControlFile),
            3 => Some(Self::ReceiveDataFile),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Acknowledgements
// ---------------------------------------------------------------------------

/// A one-byte acknowledgement. Zero is success, anything else is a failure
/// code chosen by the queue backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ack(pub u8);

impl Ack {
    pub const SUCCESS: Ack = Ack(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    pub fn byte(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Charset
// ---------------------------------------------------------------------------

/// Byte encoding for command operands and queue-state text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Charset {
    /// 7-bit US-ASCII (the RFC 1179 default).
    #[default]
    Ascii,
    /// ISO-8859-1.
    Latin1,
    Utf8,
}

impl Charset {
    /// Encode text; characters the charset cannot represent become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Self::Utf8 => text.as_bytes().to_vec(),
        }
    }

    /// Decode bytes; bytes the charset cannot represent become U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Self::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ascii => "US-ASCII",
            Self::Latin1 => "ISO-8859-1",
            Self::Utf8 => "UTF-8",
        }
    }
}

impl FromStr for Charset {
    type Err = LpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" | "us-ascii" => Ok(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            other => Err(LpdError::Config(format!("unsupported charset: {other}"))),
        }
    }
}

impl TryFrom<String> for Charset {
    type Error = LpdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Charset> for String {
    fn from(charset: Charset) -> Self {
        charset.name().to_string()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Job identifiers
// ---------------------------------------------------------------------------

/// Server-generated print job identifier, `<epoch-millis>-<sequence>`.
///
/// Also the name of the job folder in the file spool, and the token clients
/// pass back in queue-state and remove-jobs lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Build an identifier from the current time and a caller-owned sequence
    /// number. Unique as long as the sequence is.
    pub fn generate(sequence: u64) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self(format!("{millis}-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Server and retry state
// ---------------------------------------------------------------------------

/// Lifecycle of the connection listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

/// How a failed client operation should be treated by a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Refused, reset or timed-out connection. Safe to retry on a fresh one.
    Transient,
    /// Missing local file or permission; the operator has to fix something.
    UserAction,
    /// The server said no, or the peer broke the protocol.
    Permanent,
}
