// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Fixed-slot ring-buffer extractor, paired with the stream driver
//! family (spec §4.6.1): a fixed-size logbook array of slots, each
//! pointing at a variable-length profile stored in the remainder of the
//! memory image.

use crate::driver::{DiveRecord, Diagnostic, EventSink, Severity};
use crate::error::{Result, Status};
use crate::extractor::{distance, read_wrapping};
use crate::framing::u16_le;

/// Geometry of one fixed-slot ring buffer. The spec's constants
/// (`SZ_MEMORY = 32000`, logbook `[0x0100, 0x1438)`, slot size `0x52`,
/// profile `[0x1438, SZ_MEMORY)`) are reproduced verbatim by
/// [`Layout::reference`]; other device families in this shape would
/// supply their own geometry here.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub logbook_begin: usize,
    pub logbook_slot_size: usize,
    pub logbook_slot_count: usize,
    pub profile_begin: u32,
    pub profile_end: u32,
    pub fingerprint_offset: usize,
    pub fingerprint_len: usize,
}

impl Layout {
    /// The illustrative constants from spec §4.4: `SZ_MEMORY = 32000`,
    /// logbook `[0x0100, 0x1438)` with `0x52`-byte slots, profile
    /// `[0x1438, SZ_MEMORY)`.
    pub fn reference() -> Self {
        let logbook_begin = 0x0100;
        let logbook_end = 0x1438;
        let logbook_slot_size = 0x52;
        Self {
            logbook_begin,
            logbook_slot_size,
            logbook_slot_count: (logbook_end - logbook_begin) / logbook_slot_size,
            profile_begin: 0x1438,
            profile_end: 32000,
            fingerprint_offset: 8,
            fingerprint_len: 4,
        }
    }

    fn region_size(&self) -> u32 {
        self.profile_end - self.profile_begin
    }

    fn slot_offset(&self, index: usize) -> usize {
        self.logbook_begin + index * self.logbook_slot_size
    }
}

fn wrap_to_region(addr: u32, begin: u32, end: u32) -> u32 {
    if addr >= end {
        begin + (addr - end)
    } else {
        addr
    }
}

/// Walks `buffer` (a full memory image) newest-first, delivering each
/// dive to `consumer` until it returns `false` or the logbook is
/// exhausted. `fingerprint` is the caller's last-seen dive fingerprint
/// (empty = download everything).
pub fn extract(
    layout: &Layout,
    buffer: &[u8],
    fingerprint: &[u8],
    sink: &mut dyn EventSink,
    consumer: &mut dyn FnMut(&DiveRecord) -> bool,
) -> Result<()> {
    if buffer.len() < layout.profile_end as usize {
        return Err(Status::DataFormat("memory image shorter than profile end".into()));
    }

    // Locate newest: scan slots in physical order, stopping at the first
    // all-0xFF slot or invalid sequence number.
    let mut count = 0usize;
    let mut latest_seq: Option<u16> = None;
    let mut latest_index = 0usize;
    for i in 0..layout.logbook_slot_count {
        let off = layout.slot_offset(i);
        let slot = &buffer[off..off + layout.logbook_slot_size];
        if slot.iter().all(|&b| b == 0xFF) {
            break;
        }
        let seq = u16_le(&slot[0..2]);
        if seq == 0xFFFF {
            break;
        }
        count += 1;
        let is_newer = match latest_seq {
            None => true,
            Some(m) => seq > m,
        };
        if is_newer {
            latest_seq = Some(seq);
            latest_index = i;
        }
    }

    let region_size = layout.region_size();
    let mut remaining_budget: i64 = region_size as i64;
    let mut degraded = false;
    let mut prev_header: Option<u32> = None;

    for i in 0..count {
        let idx = (latest_index + layout.logbook_slot_count - i) % layout.logbook_slot_count;
        let off = layout.slot_offset(idx);
        let slot = &buffer[off..off + layout.logbook_slot_size];

        // header/footer are absolute device addresses stored as 16-bit
        // values; reinterpret them directly against the profile range.
        let header = u16_le(&slot[2..4]) as u32;
        let footer = u16_le(&slot[4..6]) as u32;

        if header < layout.profile_begin
            || header > layout.profile_end - 2
            || footer < layout.profile_begin
            || footer > layout.profile_end - 2
        {
            return Err(Status::DataFormat(format!(
                "logbook slot {idx}: header/footer out of profile range (header={header:#x}, footer={footer:#x})"
            )));
        }
        if header == footer {
            return Err(Status::DataFormat(format!(
                "logbook slot {idx}: header and footer must be distinct"
            )));
        }

        if let Some(ph) = prev_header {
            let trailing = wrap_to_region(footer + 2, layout.profile_begin, layout.profile_end);
            if ph != trailing {
                return Err(Status::DataFormat(format!(
                    "logbook slot {idx}: profile discontinuity (previous header {ph:#x} != trailing {trailing:#x})"
                )));
            }
        }
        prev_header = Some(header);

        let flen = layout.fingerprint_len.min(layout.logbook_slot_size - layout.fingerprint_offset);
        let slot_fingerprint = &slot[layout.fingerprint_offset..layout.fingerprint_offset + flen];
        if !fingerprint.is_empty() && fingerprint == slot_fingerprint {
            break;
        }

        let length = if degraded {
            0
        } else {
            let dist = distance(header, footer, region_size);
            if dist < 2 {
                return Err(Status::DataFormat(format!(
                    "logbook slot {idx}: header/footer distance too small ({dist})"
                )));
            }
            let check_header = u16_le(&buffer[footer as usize..footer as usize + 2]);
            let check_footer = u16_le(&buffer[header as usize..header as usize + 2]);
            if check_header as u32 != header || check_footer as u32 != footer {
                return Err(Status::DataFormat(format!(
                    "logbook slot {idx}: header/footer cross-check failed"
                )));
            }
            (dist - 2) as usize
        };

        let mut bytes = Vec::with_capacity(layout.logbook_slot_size + length);
        bytes.extend_from_slice(slot);
        if length > 0 {
            let profile_region = &buffer[layout.profile_begin as usize..layout.profile_end as usize];
            let profile_addr = header + 2;
            let rel_start = ((profile_addr - layout.profile_begin) % region_size) as usize;
            bytes.extend(read_wrapping(profile_region, rel_start, length));
        }

        let record = DiveRecord {
            bytes,
            fingerprint_offset: layout.fingerprint_offset,
            fingerprint_len: flen,
        };

        if !degraded {
            remaining_budget -= length as i64 + 4;
            if remaining_budget < 0 {
                degraded = true;
                sink.on_diagnostic(&Diagnostic {
                    severity: Severity::Warning,
                    message: format!(
                        "ring-buffer budget exhausted after slot {idx}; remaining logbook entries will be delivered without profile data"
                    ),
                });
            }
        }

        let keep_going = consumer(&record);
        if !keep_going {
            return Ok(());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullSink;

    const SZ_MEMORY: usize = 32000;

    fn make_buffer() -> Vec<u8> {
        vec![0xFFu8; SZ_MEMORY]
    }

    fn write_slot(buf: &mut [u8], layout: &Layout, index: usize, seq: u16, header: u32, footer: u32, fp: &[u8]) {
        let off = layout.slot_offset(index);
        let slot = &mut buf[off..off + layout.logbook_slot_size];
        slot.fill(0);
        slot[0..2].copy_from_slice(&seq.to_le_bytes());
        slot[2..4].copy_from_slice(&(header as u16).to_le_bytes());
        slot[4..6].copy_from_slice(&(footer as u16).to_le_bytes());
        slot[layout.fingerprint_offset..layout.fingerprint_offset + fp.len()].copy_from_slice(fp);
    }

    /// Builds a buffer with contiguous profiles for each `(physical_slot_index,
    /// seq, profile_len, fingerprint)` tuple, processed oldest-first so
    /// adjacent profiles satisfy the continuity invariant, then writes
    /// the logbook slots at the requested physical indices (mirrors
    /// spec scenario 6, where physical order and sequence order differ).
    fn build_chain(layout: &Layout, dives: &[(usize, u16, usize, &[u8])]) -> Vec<u8> {
        let mut buf = make_buffer();
        let region_size = layout.region_size();
        let mut cursor = layout.profile_begin; // oldest dive's header starts here
        let mut placements = Vec::new();
        for &(phys, seq, len, fp) in dives {
            let header = cursor;
            // Choose footer so that distance(header, footer) - 2 == len.
            let footer = (header - layout.profile_begin + len as u32 + 2) % region_size + layout.profile_begin;

            let profile_region = &mut buf[layout.profile_begin as usize..layout.profile_end as usize];
            let profile_region_start = ((header + 2 - layout.profile_begin) % region_size) as usize;
            for k in 0..len {
                let pos = (profile_region_start + k) % region_size as usize;
                profile_region[pos] = (k % 256) as u8;
            }
            // Cross-check markers at the (unwrapped) header/footer addresses.
            buf[footer as usize..footer as usize + 2].copy_from_slice(&(header as u16).to_le_bytes());
            buf[header as usize..header as usize + 2].copy_from_slice(&(footer as u16).to_le_bytes());

            placements.push((phys, seq, header, footer, fp));
            cursor = (footer - layout.profile_begin + 2) % region_size + layout.profile_begin;
        }
        for (phys, seq, header, footer, fp) in placements {
            write_slot(&mut buf, layout, phys, seq, header, footer, fp);
        }
        buf
    }

    /// A logbook with only 3 physical slots (spec scenario 6), rather than
    /// the reference layout's 60, so `(latest + COUNT - i) mod COUNT`
    /// wraps within the slots actually written by the test.
    fn small_layout() -> Layout {
        let mut layout = Layout::reference();
        layout.logbook_slot_count = 3;
        layout
    }

    #[test]
    fn newest_first_ordering_scenario_6() {
        let layout = small_layout();
        // physical indices (0,1,2) hold sequences (7,8,6): newest is
        // index 1 (seq 8), then index 0 (seq 7), then index 2 (seq 6).
        // Built oldest-first so profiles stay contiguous.
        let buf = build_chain(
            &layout,
            &[(2, 6, 10, b"fp06"), (0, 7, 10, b"fp07"), (1, 8, 10, b"fp08")],
        );
        let mut visited = Vec::new();
        let mut sink = NullSink;
        extract(&layout, &buf, b"", &mut sink, &mut |rec| {
            visited.push(u16_le(&rec.bytes[0..2]));
            true
        })
        .unwrap();
        assert_eq!(visited, vec![8, 7, 6]);
    }

    #[test]
    fn fingerprint_gate_stops_at_match() {
        let layout = small_layout();
        let buf = build_chain(
            &layout,
            &[
                (2, 6, 10, b"fp06"),
                (0, 7, 10, b"fp07"),
                (1, 8, 10, b"fp08"),
            ],
        );
        let mut delivered = 0;
        let mut sink = NullSink;
        extract(&layout, &buf, b"fp07", &mut sink, &mut |_rec| {
            delivered += 1;
            true
        })
        .unwrap();
        // Newest-first order is seq8, seq7, seq6. A fingerprint matching
        // seq7 (the 2nd newest) stops before delivering it or anything
        // older: exactly 1 record (seq8) is delivered.
        assert_eq!(delivered, 1);
    }

    #[test]
    fn consumer_stop_halts_iteration() {
        let layout = small_layout();
        let buf = build_chain(
            &layout,
            &[(2, 6, 10, b"fp06"), (0, 7, 10, b"fp07"), (1, 8, 10, b"fp08")],
        );
        let mut delivered = 0;
        let mut sink = NullSink;
        extract(&layout, &buf, b"", &mut sink, &mut |_rec| {
            delivered += 1;
            false
        })
        .unwrap();
        assert_eq!(delivered, 1);
    }

    #[test]
    fn bad_cross_check_is_data_format_error() {
        let layout = Layout::reference();
        let mut buf = build_chain(&layout, &[(0, 1, 10, b"fp01")]);
        // Corrupt the footer cross-check marker.
        let footer = u16_le(&buf[layout.slot_offset(0) + 4..layout.slot_offset(0) + 6]) as u32;
        buf[footer as usize] ^= 0xFF;
        let mut sink = NullSink;
        let result = extract(&layout, &buf, b"", &mut sink, &mut |_| true);
        assert!(matches!(result, Err(Status::DataFormat(_))));
    }
}
