// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

use thiserror::Error;

/// Tagged result of any transport, framing, or driver operation.
///
/// This is the crate's one error type; every fallible operation in
/// `transport`, `framing`, `retry`, `driver`, and `extractor` returns
/// `Result<T>` built on this enum rather than an opaque error bag, since
/// callers are expected to match on the concrete failure mode (e.g. retry
/// on `Timeout`, abort on `DataFormat`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Status {
    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    #[error("out of memory")]
    NoMemory,

    #[error("access denied: {0}")]
    NoAccess(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("transport I/O error: {0}")]
    Io(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("data format violation: {0}")]
    DataFormat(String),

    #[error("no matching device found")]
    NoDevice,

    #[error("done")]
    Done,
}

pub type Result<T> = std::result::Result<T, Status>;

impl Status {
    /// Combine two statuses, preferring the first failure. If `a` is not
    /// `Success` (i.e. is `Err` in Rust's representation this becomes
    /// "prefer the earlier error"), it wins; otherwise `b` is returned.
    ///
    /// Used when two cleanup steps may each fail and only one status can
    /// be reported upward (e.g. failing to flush a scratch buffer and
    /// failing to close a transport in the same teardown).
    pub fn combine<T>(a: Result<T>, b: Result<T>) -> Result<T> {
        match a {
            Err(e) => Err(e),
            Ok(_) => b,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Status::Protocol(_) | Status::Timeout)
    }
}

impl From<std::io::Error> for Status {
    fn from(e: std::io::Error) -> Self {
        Status::Io(e.to_string())
    }
}
