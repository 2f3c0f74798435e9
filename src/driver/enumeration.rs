// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Enumeration/IrDA driver family (spec §4.5): binary handshake,
//! length-prefixed bulk transfer, self-describing ring-buffer decode.
//! Representative of IrDA-attached devices with binary framing rather
//! than the stream family's ASCII-hex envelopes.

use log::info;

use crate::driver::{ClockSync, Consumer, DeviceInfo as DiveDeviceInfo, Driver, EventSink, Progress};
use crate::error::{Result, Status};
use crate::extractor::self_describing;
use crate::framing::u32_le;
use crate::retry::{self, CancellationToken, RetryPolicy};
use crate::transport::{Direction, Timeout, Transport};

const HANDSHAKE1_CMD: u8 = 0x1B;
const HANDSHAKE1_ACK: u8 = 0x01;
const HANDSHAKE2_CMD: u8 = 0x1C;
const HANDSHAKE2_PARAMS: [u8; 4] = [0x10, 0x27, 0x00, 0x00];
const HANDSHAKE2_ACK: u8 = 0x01;

const CMD_MODEL: u8 = 0x10;
const CMD_SERIAL: u8 = 0x14;
const CMD_CLOCK: u8 = 0x1A;
const CMD_LENGTH_PROBE: u8 = 0xC6;
const CMD_DATA_FETCH: u8 = 0xC4;

const FINGERPRINT_LEN: usize = 4;

/// Discovers devices of this family by matching an allow-listed model
/// name (spec §4.5: "opened by a name rather than a fixed path" —
/// concrete IrDA discovery is out of scope, so this trait is the
/// crate's own boundary for a caller-supplied enumerator).
pub trait DeviceEnumerator {
    /// Returns the open-able transport names visible right now.
    fn discover(&mut self) -> Result<Vec<String>>;
}

/// Model names this driver recognizes among `DeviceEnumerator::discover`'s
/// results (case-insensitive exact match).
pub const ALLOWED_MODEL_NAMES: &[&str] = &["REFERENCE-E1", "REFERENCE-E2"];

/// Picks the first discovered name matching [`ALLOWED_MODEL_NAMES`].
pub fn select_device(candidates: &[String]) -> Option<&str> {
    candidates
        .iter()
        .find(|name| {
            ALLOWED_MODEL_NAMES
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(name))
        })
        .map(String::as_str)
}

/// Open-time and dump-time tunables for the enumeration family.
#[derive(Debug, Clone, Copy)]
pub struct EnumerationConfig {
    pub handshake_timeout_ms: u32,
    pub read_timeout_ms: u32,
    pub min_chunk: usize,
    pub retry: RetryPolicy,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 3000,
            read_timeout_ms: 3000,
            min_chunk: 32,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct EnumerationDriver {
    transport: Box<dyn Transport>,
    config: EnumerationConfig,
    fingerprint: Vec<u8>,
    cancel: CancellationToken,
}

impl EnumerationDriver {
    /// Opens `name` on `transport` and runs the two-step binary
    /// handshake (`0x1B` -> `0x01`, then `0x1C 0x10 0x27 0x00 0x00` ->
    /// `0x01`); any other response is `Status::Protocol`.
    pub fn open(mut transport: Box<dyn Transport>, name: &str, config: EnumerationConfig) -> Result<Self> {
        transport.open(name)?;

        let open_result = (|| -> Result<()> {
            transport.set_timeout(Timeout::Millis(config.handshake_timeout_ms))?;
            transport.purge(Direction::ALL)?;

            transport.write(&[HANDSHAKE1_CMD])?;
            let mut ack = [0u8; 1];
            transport.read(&mut ack)?;
            if ack[0] != HANDSHAKE1_ACK {
                return Err(Status::Protocol(format!(
                    "handshake step 1: expected {HANDSHAKE1_ACK:#04x}, got {:#04x}",
                    ack[0]
                )));
            }

            let mut step2 = Vec::with_capacity(1 + HANDSHAKE2_PARAMS.len());
            step2.push(HANDSHAKE2_CMD);
            step2.extend_from_slice(&HANDSHAKE2_PARAMS);
            transport.write(&step2)?;
            transport.read(&mut ack)?;
            if ack[0] != HANDSHAKE2_ACK {
                return Err(Status::Protocol(format!(
                    "handshake step 2: expected {HANDSHAKE2_ACK:#04x}, got {:#04x}",
                    ack[0]
                )));
            }

            transport.set_timeout(Timeout::Millis(config.read_timeout_ms))?;
            Ok(())
        })();

        if let Err(e) = open_result {
            let _ = transport.close();
            return Err(e);
        }

        Ok(Self {
            transport,
            config,
            fingerprint: Vec::new(),
            cancel: CancellationToken::new(),
        })
    }

    fn transfer(&mut self, cmd: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        retry::transfer_raw(self.transport.as_mut(), &self.cancel, &self.config.retry, cmd, expected_len)
    }

    /// The 9-byte bulk command `[cmd, ts0..ts3, 0x10, 0x27, 0x00, 0x00]`:
    /// `ts` is the stored fingerprint (a little-endian timestamp cursor),
    /// or all-zero when nothing has been downloaded yet.
    fn bulk_command(&self, cmd: u8) -> [u8; 9] {
        let mut buf = [0u8; 9];
        buf[0] = cmd;
        if self.fingerprint.len() == FINGERPRINT_LEN {
            buf[1..5].copy_from_slice(&self.fingerprint);
        }
        buf[5..9].copy_from_slice(&HANDSHAKE2_PARAMS);
        buf
    }
}

impl Driver for EnumerationDriver {
    fn set_fingerprint(&mut self, fingerprint: &[u8]) -> Result<()> {
        if fingerprint.is_empty() {
            self.fingerprint.clear();
            return Ok(());
        }
        if fingerprint.len() != FINGERPRINT_LEN {
            return Err(Status::InvalidArgs(format!(
                "fingerprint must be empty or {FINGERPRINT_LEN} bytes, got {}",
                fingerprint.len()
            )));
        }
        self.fingerprint = fingerprint.to_vec();
        Ok(())
    }

    fn dump(&mut self, buffer: &mut Vec<u8>, sink: &mut dyn EventSink) -> Result<()> {
        buffer.clear();

        let model = self.transfer(&[CMD_MODEL], 1)?[0] as u32;
        let serial = u32_le(&self.transfer(&[CMD_SERIAL], 4)?);
        let devtime = u32_le(&self.transfer(&[CMD_CLOCK], 4)?) as i64;
        let systime = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        info!("enumeration driver: model={model} serial={serial}");
        sink.on_progress(Progress { current: 0, maximum: 0 });
        sink.on_clock(ClockSync { systime, devtime });
        sink.on_device_info(&DiveDeviceInfo { model, firmware: 0, serial });

        let length = u32_le(&self.transfer(&self.bulk_command(CMD_LENGTH_PROBE), 4)?) as usize;
        let maximum = 13 + if length > 0 { length + 4 } else { 0 };
        sink.on_progress(Progress { current: 0, maximum: maximum as u64 });

        if length == 0 {
            return Ok(());
        }

        buffer.resize(length, 0);
        let total = u32_le(&self.transfer(&self.bulk_command(CMD_DATA_FETCH), 4)?) as usize;
        if total != length + 4 {
            return Err(Status::Protocol(format!(
                "data-fetch header mismatch: expected total {}, got {total}",
                length + 4
            )));
        }

        let mut filled = 0usize;
        while filled < length {
            if self.cancel.is_cancelled() {
                return Err(Status::Cancelled);
            }
            let available = self.transport.get_available()?;
            let want = self.config.min_chunk.max(available).min(length - filled);
            let mut chunk = vec![0u8; want];
            self.transport.read(&mut chunk)?;
            buffer[filled..filled + want].copy_from_slice(&chunk);
            filled += want;
            sink.on_progress(Progress {
                current: (13 + 4 + filled) as u64,
                maximum: maximum as u64,
            });
        }

        Ok(())
    }

    fn foreach(&mut self, consumer: &mut Consumer<'_>, sink: &mut dyn EventSink) -> Result<()> {
        let mut buffer = Vec::new();
        self.dump(&mut buffer, sink)?;
        self_describing::extract(&buffer, consumer)
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
