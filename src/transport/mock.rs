// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! In-memory [`Transport`] used by this crate's own tests, and available
//! to downstream drivers that want to exercise their protocol logic
//! without real hardware (the same role a stub vtable plays in the
//! original C test suite).

use std::collections::VecDeque;

use super::{Direction, Line, SerialConfig, Timeout, Transferred, Transport};
use crate::error::{Result, Status};

/// A single scripted response to a `read` call.
#[derive(Debug, Clone)]
enum ReadStep {
    /// Return these bytes (possibly fewer than requested -> short read).
    Bytes(Vec<u8>),
    /// Fail the read with `Timeout` regardless of how many bytes were
    /// requested; no bytes are produced.
    Timeout,
    /// Fail the read with `Protocol` (used to script retry-bound tests).
    Protocol(String),
    /// Fail the read with an unrecoverable I/O error.
    Io(String),
}

/// Scriptable, in-memory stand-in for a real transport.
///
/// Queue up expected writes (optional, for assertions) and canned reads
/// with [`MockTransport::push_read`]/[`MockTransport::push_read_error`],
/// then hand it to a driver exactly as a real transport would be.
pub struct MockTransport {
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    available: usize,
    purge_calls: Vec<Direction>,
    sleep_calls: Vec<u32>,
    open_calls: Vec<String>,
    closed: bool,
    lines: Line,
    fail_writes: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            written: Vec::new(),
            available: 0,
            purge_calls: Vec::new(),
            sleep_calls: Vec::new(),
            open_calls: Vec::new(),
            closed: false,
            lines: Line::empty(),
            fail_writes: false,
        }
    }

    pub fn push_read(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.reads.push_back(ReadStep::Bytes(bytes.into()));
        self
    }

    pub fn push_timeout(&mut self) -> &mut Self {
        self.reads.push_back(ReadStep::Timeout);
        self
    }

    pub fn push_protocol_error(&mut self, msg: impl Into<String>) -> &mut Self {
        self.reads.push_back(ReadStep::Protocol(msg.into()));
        self
    }

    pub fn push_io_error(&mut self, msg: impl Into<String>) -> &mut Self {
        self.reads.push_back(ReadStep::Io(msg.into()));
        self
    }

    /// Schedule `count` consecutive `Protocol` failures followed by a
    /// successful read of `good`, as used by the retry-bound property test.
    pub fn push_failures_then(&mut self, count: usize, good: impl Into<Vec<u8>>) -> &mut Self {
        for _ in 0..count {
            self.push_protocol_error("injected failure");
        }
        self.push_read(good);
        self
    }

    pub fn set_available(&mut self, n: usize) -> &mut Self {
        self.available = n;
        self
    }

    pub fn set_lines(&mut self, lines: Line) -> &mut Self {
        self.lines = lines;
        self
    }

    pub fn fail_next_write(&mut self) -> &mut Self {
        self.fail_writes = true;
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn purge_calls(&self) -> &[Direction] {
        &self.purge_calls
    }

    pub fn sleep_calls(&self) -> &[u32] {
        &self.sleep_calls
    }

    pub fn open_calls(&self) -> &[String] {
        &self.open_calls
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for MockTransport {
    fn open(&mut self, name: &str) -> Result<()> {
        self.open_calls.push(name.to_string());
        self.closed = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<Transferred> {
        match self.reads.pop_front() {
            None => Err(Status::Timeout),
            Some(ReadStep::Timeout) => Err(Status::Timeout),
            Some(ReadStep::Protocol(msg)) => Err(Status::Protocol(msg)),
            Some(ReadStep::Io(msg)) => Err(Status::Io(msg)),
            Some(ReadStep::Bytes(bytes)) => {
                let n = dst.len().min(bytes.len());
                dst[..n].copy_from_slice(&bytes[..n]);
                if n < dst.len() {
                    Err(Status::Timeout)
                } else {
                    Ok(n)
                }
            }
        }
    }

    fn write(&mut self, src: &[u8]) -> Result<Transferred> {
        if self.fail_writes {
            self.fail_writes = false;
            return Err(Status::Io("injected write failure".into()));
        }
        self.written.extend_from_slice(src);
        Ok(src.len())
    }

    fn purge(&mut self, direction: Direction) -> Result<()> {
        self.purge_calls.push(direction);
        Ok(())
    }

    fn get_available(&mut self) -> Result<usize> {
        Ok(self.available)
    }

    fn set_timeout(&mut self, _timeout: Timeout) -> Result<()> {
        Ok(())
    }

    fn configure(&mut self, _config: SerialConfig) -> Result<()> {
        Ok(())
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn set_rts(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn sleep(&mut self, ms: u32) {
        self.sleep_calls.push(ms);
    }

    fn get_lines(&mut self) -> Result<Line> {
        Ok(self.lines)
    }
}
