// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! End-to-end coverage of the stream driver family against
//! `MockTransport`: probe handshake, adaptive chunked dump, CRC
//! verification, and ring-buffer extraction via `foreach`.

use divecomputer_core::driver::stream::{StreamConfig, StreamDriver};
use divecomputer_core::driver::{Driver, NullSink};
use divecomputer_core::framing;
use divecomputer_core::transport::mock::MockTransport;

fn push_le_crc(transport: &mut MockTransport, crc: u16) {
    let mut bytes = [0u8; 2];
    bytes[0] = (crc >> 8) as u8;
    bytes[1] = crc as u8;
    transport.push_read(framing::bin2hex(&bytes).into_bytes());
}

#[test]
fn dump_and_foreach_deliver_one_dive() {
    let mut config = StreamConfig::default();
    config.memory_size = 0x1438 + 64; // logbook region + one 64-byte profile

    let memory_size = config.memory_size;
    let logbook_begin = 0x0100usize;
    let logbook_slot_size = 0x52usize;
    let profile_begin = 0x1438u32;
    let profile_end = memory_size as u32;

    let mut image = vec![0xFFu8; memory_size];
    image[0] = 0x09; // model
    image[1] = 0x34; // serial low
    image[2] = 0x12;
    image[3] = 0x00;

    let profile_len = 16usize;
    let header = profile_begin;
    let footer = header + profile_len as u32 + 2;

    let slot = &mut image[logbook_begin..logbook_begin + logbook_slot_size];
    slot.fill(0);
    slot[0..2].copy_from_slice(&1u16.to_le_bytes());
    slot[2..4].copy_from_slice(&(header as u16).to_le_bytes());
    slot[4..6].copy_from_slice(&(footer as u16).to_le_bytes());
    slot[8..12].copy_from_slice(b"fp01");

    for (k, byte) in image[(header + 2) as usize..footer as usize].iter_mut().enumerate() {
        *byte = (k % 256) as u8;
    }
    let header_bytes = (header as u16).to_le_bytes();
    let footer_bytes = (footer as u16).to_le_bytes();
    image[footer as usize..footer as usize + 2].copy_from_slice(&header_bytes);
    image[header as usize..header as usize + 2].copy_from_slice(&footer_bytes);

    let mut transport = MockTransport::new();
    transport.push_read(b"{!D5B3}".to_vec());
    // The dump loop requests the configured chunk size (1024 by
    // default) per read when `get_available` reports nothing larger, so
    // the scripted reads must be pre-split to match.
    let mut offset = 0usize;
    while offset < image.len() {
        let end = (offset + config.min_chunk).min(image.len());
        transport.push_read(image[offset..end].to_vec());
        offset = end;
    }
    push_le_crc(&mut transport, framing::crc(&image));
    transport.set_available(0);

    let mut driver = StreamDriver::open(Box::new(transport), "mock://device", config).unwrap();
    let mut sink = NullSink;
    let mut delivered = Vec::new();
    driver
        .foreach(
            &mut |rec| {
                delivered.push(rec.fingerprint().to_vec());
                true
            },
            &mut sink,
        )
        .unwrap();

    assert_eq!(delivered, vec![b"fp01".to_vec()]);
}
