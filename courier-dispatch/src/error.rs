//! Run-level and configuration errors.
//!
//! Per-message failures are not errors at this level: they become failed
//! [`SendAttempt`](crate::SendAttempt)s carrying an
//! [`ErrorReport`](crate::ErrorReport).

use std::{io, path::PathBuf};

use thiserror::Error;

/// Conditions that stop a campaign before its messages are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The pool has no endpoints to rotate through.
    #[error("No endpoints available")]
    NoEndpointsAvailable,

    /// A full rotation found no endpoint that passed its probe.
    #[error("No healthy endpoints after probing {probed}")]
    NoHealthyEndpoints { probed: usize },

    /// The sending window could never open.
    #[error(transparent)]
    InvalidWindow(#[from] WindowError),
}

/// Sending-window hours that can never be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Sending window {field} {hour} is not an hour of the day (0-23)")]
    HourOutOfRange { field: &'static str, hour: u32 },

    /// Windows crossing midnight are not supported.
    #[error("Sending window starts at {start_hour}:00 after it ends at {end_hour}:59")]
    Inverted { start_hour: u32, end_hour: u32 },
}

/// A single unusable line in an endpoint file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct LineError {
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No usable endpoints in {}", path.display())]
    Empty { path: PathBuf },

    #[error(transparent)]
    Window(#[from] WindowError),
}
