// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LPD core: wire types, configuration and error definitions shared by the
// client, the server and the binaries.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ClientConfig, ScriptConfig, ServerConfig};
pub use error::{LpdError, Result};
pub use types::*;
