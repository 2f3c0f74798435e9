// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Uniform byte-stream / packet transport abstraction.
//!
//! The driver core depends only on the [`Transport`] trait defined here; it
//! never talks to an OS serial port, an IrDA socket, or a BLE-GATT
//! characteristic directly. Concrete bindings for those live outside this
//! crate and are handed to a driver at `open` time. [`mock`] ships an
//! in-memory implementation used by this crate's own tests and available to
//! downstream drivers for their own test harnesses.

pub mod mock;

use crate::error::Result;

bitflags::bitflags! {
    /// Direction(s) to purge or otherwise act on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Direction: u8 {
        const INPUT = 0b01;
        const OUTPUT = 0b10;
        const ALL = 0b11;
    }
}

bitflags::bitflags! {
    /// Modem control line bitmask reported by [`Transport::get_lines`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Line: u8 {
        const DCD = 0b0001;
        const CTS = 0b0010;
        const DSR = 0b0100;
        const RNG = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

/// Non-blocking-poll / block-forever / deadline selector for [`Transport::set_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block indefinitely.
    Infinite,
    /// Return immediately with whatever is already available.
    NonBlocking,
    /// Block up to this many milliseconds.
    Millis(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

/// Result of a partial-allowed read or write: how many bytes actually
/// moved, paired with the [`Status`](crate::error::Status) via the
/// surrounding `Result`.
pub type Transferred = usize;

/// The core's entire dependency on the outside world. Implementors bind
/// this to a real serial port, an IrDA stream, a TCP socket, or a
/// BLE-GATT-like packet channel.
///
/// Contracts (see spec §4.1):
/// - `read`/`write` retry `EINTR`/`EAGAIN` transparently; they only return
///   to the caller on `Success` (all bytes moved), `Timeout` (deadline hit,
///   partial count returned), or an unrecoverable `Io`/other error.
/// - Operations not meaningful for a given transport (e.g. `configure` on
///   an IrDA transport) are no-ops returning `Ok(())`/`Ok(0)`, not errors.
pub trait Transport: Send {
    fn open(&mut self, name: &str) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Reads exactly `dst.len()` bytes unless a timeout or error cuts the
    /// read short. Returns the number of bytes actually placed into `dst`.
    fn read(&mut self, dst: &mut [u8]) -> Result<Transferred>;

    /// Writes exactly `src.len()` bytes unless an error cuts the write
    /// short. Returns the number of bytes actually written.
    fn write(&mut self, src: &[u8]) -> Result<Transferred>;

    fn purge(&mut self, direction: Direction) -> Result<()>;
    fn get_available(&mut self) -> Result<usize>;
    fn set_timeout(&mut self, timeout: Timeout) -> Result<()>;

    /// No-op (`Ok(())`) on transports without the concept of line
    /// parameters (IrDA, Socket, Packet).
    fn configure(&mut self, _config: SerialConfig) -> Result<()> {
        Ok(())
    }

    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn set_rts(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    fn set_halfduplex(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn set_break(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    /// Cooperative yield of at least `ms` milliseconds. Real
    /// implementations sleep the calling thread; the mock transport
    /// advances a virtual clock instead so tests stay fast.
    fn sleep(&mut self, ms: u32);

    /// Bitmask of currently-asserted modem lines; 0 where not applicable.
    fn get_lines(&mut self) -> Result<Line> {
        Ok(Line::empty())
    }
}

/// Wraps a caller-supplied transport implementation, optionally tagging it
/// as packet-framed. This is the crate's only "Custom" transport variant:
/// rather than fusing a vtable with driver-private user data (as the
/// original C vtable-plus-userdata design does), the core only ever holds
/// a `Box<dyn Transport>`; any additional per-instance state the caller
/// needs lives inside their own implementation, not here.
pub struct Custom {
    inner: Box<dyn Transport>,
    packet_size: Option<usize>,
}

impl Custom {
    pub fn new(inner: Box<dyn Transport>) -> Self {
        Self { inner, packet_size: None }
    }

    /// Selects packet semantics: `read`/`write` operate on whole
    /// `packet_size`-byte frames, mirroring a BLE-GATT characteristic
    /// stacked underneath a driver that otherwise expects a byte stream.
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = Some(packet_size);
        self
    }

    pub fn packet_size(&self) -> Option<usize> {
        self.packet_size
    }
}

impl Transport for Custom {
    fn open(&mut self, name: &str) -> Result<()> {
        self.inner.open(name)
    }
    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
    fn read(&mut self, dst: &mut [u8]) -> Result<Transferred> {
        match self.packet_size {
            None => self.inner.read(dst),
            Some(pkt) => {
                let n = dst.len().min(pkt);
                let mut scratch = vec![0u8; pkt];
                let got = self.inner.read(&mut scratch)?;
                let take = n.min(got);
                dst[..take].copy_from_slice(&scratch[..take]);
                Ok(take)
            }
        }
    }
    fn write(&mut self, src: &[u8]) -> Result<Transferred> {
        self.inner.write(src)
    }
    fn purge(&mut self, direction: Direction) -> Result<()> {
        if self.packet_size.is_some() {
            return Ok(());
        }
        self.inner.purge(direction)
    }
    fn get_available(&mut self) -> Result<usize> {
        self.inner.get_available()
    }
    fn set_timeout(&mut self, timeout: Timeout) -> Result<()> {
        self.inner.set_timeout(timeout)
    }
    fn configure(&mut self, config: SerialConfig) -> Result<()> {
        if self.packet_size.is_some() {
            return Ok(());
        }
        self.inner.configure(config)
    }
    fn set_dtr(&mut self, level: bool) -> Result<()> {
        if self.packet_size.is_some() {
            return Ok(());
        }
        self.inner.set_dtr(level)
    }
    fn set_rts(&mut self, level: bool) -> Result<()> {
        if self.packet_size.is_some() {
            return Ok(());
        }
        self.inner.set_rts(level)
    }
    fn sleep(&mut self, ms: u32) {
        self.inner.sleep(ms)
    }
    fn get_lines(&mut self) -> Result<Line> {
        if self.packet_size.is_some() {
            return Ok(Line::empty());
        }
        self.inner.get_lines()
    }
}
