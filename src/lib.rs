// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Device-driver core for dive computer communication.
//!
//! This crate is the hardware-agnostic heart of a dive-computer access
//! library: a [`transport::Transport`] trait any caller binds to a real
//! serial port, IrDA socket, or packet channel; ASCII-hex envelope
//! [`framing`] with CRC-CCITT checking; a retrying, cancellable
//! [`retry::transfer`] built on top of it; two representative
//! [`driver`] families (stream-oriented and enumeration-oriented); and
//! the ring-buffer [`extractor`] each of those families decodes its log
//! with.
//!
//! Nothing in this crate touches an operating system API directly —
//! `transport::mock` is the only concrete [`transport::Transport`]
//! shipped here, used by this crate's own tests. A real application
//! supplies its own serial/IrDA/Bluetooth bindings and hands them to a
//! [`driver::Driver`] at `open` time.

pub mod config;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod framing;
pub mod logging;
pub mod retry;
pub mod transport;

pub use driver::{
    ClockSync, Consumer, Diagnostic, Driver, DeviceInfo, DiveRecord, EventSink, NullSink, Progress, Severity,
};
pub use error::{Result, Status};
pub use retry::CancellationToken;
pub use transport::Transport;
