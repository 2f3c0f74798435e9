// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Stream-oriented driver family (spec §4.4): wired serial, ASCII-hex
//! framing, CRC-CCITT, ring-buffer decode. Representative of serial
//! dive computers that expose their whole memory image as one dump.

use log::{debug, info};

use crate::driver::{Consumer, DeviceInfo as DiveDeviceInfo, Driver, EventSink, Progress};
use crate::error::{Result, Status};
use crate::extractor::fixed_slot::{self, Layout};
use crate::framing::{self, u24_le};
use crate::retry::{self, CancellationToken, RetryPolicy};
use crate::transport::{Direction, FlowControl, Parity, SerialConfig, StopBits, Timeout, Transport};

/// Open-time and dump-time tunables for the stream family, overridable
/// by a caller before `open` (spec §10.3 configuration).
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub baud_rate: u32,
    pub read_timeout_ms: u32,
    pub rts_dtr_settle_ms: u32,
    pub dtr_low_settle_ms: u32,
    pub memory_size: usize,
    pub min_chunk: usize,
    pub read_packet_size: usize,
    pub retry: RetryPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            rts_dtr_settle_ms: 200,
            dtr_low_settle_ms: 100,
            memory_size: 32_000,
            min_chunk: 1024,
            read_packet_size: 32,
            retry: RetryPolicy::default(),
        }
    }
}

const PROBE_CMD: &[u8] = b"{123DBA}";
const PROBE_RESPONSE: &[u8] = b"{!D5B3}";
const FINGERPRINT_LEN: usize = 4;

pub struct StreamDriver {
    transport: Box<dyn Transport>,
    config: StreamConfig,
    layout: Layout,
    fingerprint: Vec<u8>,
    cancel: CancellationToken,
}

impl StreamDriver {
    /// Opens `name` on `transport`: configures 115200/8N1/no-flow,
    /// sets a 1000 ms read timeout, pulses RTS/DTR to reset the device,
    /// purges both directions, and starts with an empty fingerprint.
    pub fn open(mut transport: Box<dyn Transport>, name: &str, config: StreamConfig) -> Result<Self> {
        transport.open(name)?;

        let open_result = (|| -> Result<()> {
            transport.configure(SerialConfig {
                baud_rate: config.baud_rate,
                data_bits: 8,
                parity: Parity::None,
                stop_bits: StopBits::One,
                flow_control: FlowControl::None,
            })?;
            transport.set_timeout(Timeout::Millis(config.read_timeout_ms))?;
            transport.set_rts(true)?;
            transport.set_dtr(true)?;
            transport.sleep(config.rts_dtr_settle_ms);
            transport.set_dtr(false)?;
            transport.sleep(config.dtr_low_settle_ms);
            transport.purge(Direction::ALL)?;
            Ok(())
        })();

        if let Err(e) = open_result {
            let _ = transport.close();
            return Err(e);
        }

        let mut layout = Layout::reference();
        layout.profile_end = config.memory_size as u32;

        Ok(Self {
            transport,
            config,
            layout,
            fingerprint: Vec::new(),
            cancel: CancellationToken::new(),
        })
    }

    fn transfer(&mut self, cmd: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        retry::transfer(self.transport.as_mut(), &self.cancel, &self.config.retry, cmd, expected_len)
    }

    /// Reads `n` bytes starting at device address `address` into `dst`,
    /// splitting into chunks of at most the configured read packet size
    /// (spec §4.4 `read`).
    pub fn read(&mut self, mut address: u32, mut dst: &mut [u8]) -> Result<()> {
        while !dst.is_empty() {
            let chunk_len = dst.len().min(self.config.read_packet_size);
            let mut payload = [0u8; 4];
            payload[0] = (address >> 8) as u8;
            payload[1] = address as u8;
            payload[2] = (chunk_len >> 8) as u8;
            payload[3] = chunk_len as u8;
            let cmd = framing::encode_envelope(&payload);
            let expected = framing::envelope_size(chunk_len);
            let answer = self.transfer(&cmd, expected)?;
            if answer.len() != chunk_len {
                return Err(Status::Protocol(format!(
                    "expected {chunk_len} bytes in response, got {}",
                    answer.len()
                )));
            }
            dst[..chunk_len].copy_from_slice(&answer);
            dst = &mut dst[chunk_len..];
            address += chunk_len as u32;
        }
        Ok(())
    }
}

impl Driver for StreamDriver {
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
        let memory_size = self.config.memory_size;
        buffer.clear();
        buffer.resize(memory_size, 0);
        sink.on_progress(Progress { current: 0, maximum: memory_size as u64 });

        if self.cancel.is_cancelled() {
            return Err(Status::Cancelled);
        }
        self.transport.write(PROBE_CMD)?;
        let mut probe_answer = vec![0u8; PROBE_RESPONSE.len()];
        self.transport.read(&mut probe_answer)?;
        if probe_answer != PROBE_RESPONSE {
            return Err(Status::Protocol("probe handshake mismatch".into()));
        }

        let mut filled = 0usize;
        while filled < memory_size {
            if self.cancel.is_cancelled() {
                return Err(Status::Cancelled);
            }
            let available = self.transport.get_available()?;
            let want = self.config.min_chunk.max(available).min(memory_size - filled);
            let mut chunk = vec![0u8; want];
            self.transport.read(&mut chunk)?;
            buffer[filled..filled + want].copy_from_slice(&chunk);
            filled += want;
            sink.on_progress(Progress { current: filled as u64, maximum: memory_size as u64 });
            debug!("stream dump: {filled}/{memory_size} bytes");
        }

        let mut trailer = [0u8; 4];
        self.transport.read(&mut trailer)?;
        let hex_crc = std::str::from_utf8(&trailer)
            .map_err(|_| Status::Protocol("trailing checksum is not ASCII hex".into()))?;
        let crc_bytes = framing::hex2bin(hex_crc)?;
        let expected_crc = framing::u16_be(&crc_bytes);
        let computed_crc = framing::crc(buffer);
        if expected_crc != computed_crc {
            return Err(Status::Protocol(format!(
                "memory image CRC mismatch: computed {computed_crc:#06x}, received {expected_crc:#06x}"
            )));
        }

        Ok(())
    }

    fn foreach(&mut self, consumer: &mut Consumer<'_>, sink: &mut dyn EventSink) -> Result<()> {
        let mut buffer = Vec::new();
        self.dump(&mut buffer, sink)?;

        if buffer.len() < 4 {
            return Err(Status::Protocol("dump buffer too short for device-info header".into()));
        }
        let model = buffer[0] as u32;
        let serial = u24_le(&buffer[1..4]);
        info!("stream driver: model={model} serial={serial}");
        sink.on_device_info(&DiveDeviceInfo { model, firmware: 0, serial });

        fixed_slot::extract(&self.layout, &buffer, &self.fingerprint, sink, consumer)
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder};
    use crate::driver::NullSink;
    use crate::transport::mock::MockTransport;

    fn open_driver(transport: MockTransport) -> StreamDriver {
        StreamDriver::open(Box::new(transport), "mock://device", StreamConfig::default()).unwrap()
    }

    #[test]
    fn open_configures_and_purges() {
        let transport = MockTransport::new();
        let driver = open_driver(transport);
        assert_eq!(driver.fingerprint, Vec::<u8>::new());
    }

    #[test]
    fn set_fingerprint_rejects_wrong_length() {
        let mut driver = open_driver(MockTransport::new());
        assert!(driver.set_fingerprint(&[1, 2]).is_err());
        assert!(driver.set_fingerprint(&[1, 2, 3, 4]).is_ok());
        assert!(driver.set_fingerprint(&[]).is_ok());
    }

    #[test]
    fn dump_rejects_bad_probe_response() {
        let mut transport = MockTransport::new();
        transport.push_read(b"{wrong!}".to_vec());
        let mut driver = open_driver(transport);
        let mut buffer = Vec::new();
        let mut sink = NullSink;
        let result = driver.dump(&mut buffer, &mut sink);
        assert!(matches!(result, Err(Status::Protocol(_))));
    }

    #[test]
    fn dump_succeeds_with_matching_crc() {
        let memory_size = 64usize; // small for test speed; config overrides default
        let mut config = StreamConfig::default();
        config.memory_size = memory_size;

        let mut transport = MockTransport::new();
        transport.push_read(PROBE_RESPONSE.to_vec());
        let body = vec![0x42u8; memory_size];
        transport.push_read(body.clone());
        let crc = framing::crc(&body);
        let hex_crc = framing::bin2hex(&{
            let mut b = [0u8; 2];
            byteorder::BigEndian::write_u16(&mut b, crc);
            b
        });
        transport.push_read(hex_crc.into_bytes());
        transport.set_available(0);

        let mut driver = StreamDriver::open(Box::new(transport), "mock://device", config).unwrap();
        let mut buffer = Vec::new();
        let mut sink = NullSink;
        driver.dump(&mut buffer, &mut sink).unwrap();
        assert_eq!(buffer.len(), memory_size);
        assert_eq!(buffer, body);
    }
}
