// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Device-driver framework shared by every concrete family: progress
//! state, dive records, the event sink, and the `Driver` trait itself.
//! [`stream`] and [`enumeration`] provide the two representative
//! instances described by the spec.

pub mod enumeration;
pub mod stream;

use crate::error::Result;

/// `(current, maximum)` byte counters for a single `dump`. Monotonic
/// non-decreasing; `maximum` may be refined upward exactly once, after
/// the device announces the true payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub current: u64,
    pub maximum: u64,
}

/// `(model, firmware, serial)` emitted exactly once per `dump`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceInfo {
    pub model: u32,
    pub firmware: u32,
    pub serial: u32,
}

/// `(systime, devtime)`, both 64-bit integers in implementation-defined
/// epochs (host wall-clock and device counter). Emitted at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ClockSync {
    pub systime: i64,
    pub devtime: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A crate-added diagnostic event (spec §7: "each failure path emits at
/// least one diagnostic message via the event sink"), also mirrored onto
/// the `log` facade at a matching level.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Sink for the three spec-defined event kinds plus the crate-added
/// diagnostic kind. All methods default to a no-op so callers opt into
/// only what they need.
pub trait EventSink {
    fn on_progress(&mut self, _progress: Progress) {}
    fn on_device_info(&mut self, _info: &DeviceInfo) {}
    fn on_clock(&mut self, _clock: ClockSync) {}
    fn on_diagnostic(&mut self, _diag: &Diagnostic) {}
}

/// An [`EventSink`] that discards every event; used when a caller has no
/// interest in progress/info/clock/diagnostic reporting.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {}

fn emit_diagnostic(sink: &mut dyn EventSink, severity: Severity, message: impl Into<String>) {
    let message = message.into();
    match severity {
        Severity::Warning => log::warn!("{message}"),
        Severity::Error => log::error!("{message}"),
    }
    sink.on_diagnostic(&Diagnostic { severity, message });
}

/// A decoded dive record: the raw bytes (logbook slot plus profile, or a
/// self-describing record), and the offset/length of the fingerprint
/// field within those bytes.
///
/// The extractor reuses one scratch buffer between dives (spec §5); a
/// `DiveRecord` owns a private copy so it's safe to hold onto past the
/// consumer callback that received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiveRecord {
    pub bytes: Vec<u8>,
    pub fingerprint_offset: usize,
    pub fingerprint_len: usize,
}

impl DiveRecord {
    pub fn fingerprint(&self) -> &[u8] {
        &self.bytes[self.fingerprint_offset..self.fingerprint_offset + self.fingerprint_len]
    }
}

/// Caller-supplied consumer: return `false` to stop iteration early
/// (still an overall success). `userdata` from the spec's C-shaped
/// signature is simply whatever the closure captures.
pub type Consumer<'a> = dyn FnMut(&DiveRecord) -> bool + 'a;

/// Common shape implemented by both driver families. `open` is
/// necessarily family-specific (different transport configuration,
/// different handshake) so it is not part of this trait; each family
/// exposes its own `open` constructor instead.
pub trait Driver {
    /// Replaces the stored fingerprint. Accepts an empty slice (clear) or
    /// exactly the family's fingerprint length; anything else is
    /// `Status::InvalidArgs`.
    fn set_fingerprint(&mut self, fingerprint: &[u8]) -> Result<()>;

    /// Downloads the full device log into `buffer`, emitting progress,
    /// device-info, and clock events on `sink` as it goes.
    fn dump(&mut self, buffer: &mut Vec<u8>, sink: &mut dyn EventSink) -> Result<()>;

    /// Downloads the log (via `dump`) and walks it with the family's
    /// ring-buffer extractor, invoking `consumer` newest-first until it
    /// returns `false` or the buffer is exhausted.
    fn foreach(&mut self, consumer: &mut Consumer<'_>, sink: &mut dyn EventSink) -> Result<()>;

    fn cancellation_token(&self) -> crate::retry::CancellationToken;
}
