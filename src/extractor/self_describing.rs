// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Self-describing ring-buffer extractor, paired with the enumeration
//! driver family (spec §4.6.2): a flat buffer of concatenated
//! variable-length records, each starting with a 4-byte marker and a
//! 4-byte little-endian length.

use crate::driver::DiveRecord;
use crate::error::{Result, Status};
use crate::framing::u32_le;

/// 4-byte marker prefixing every self-describing dive record.
pub const MARKER: [u8; 4] = [0xA5, 0xA5, 0x5A, 0x5A];

const FINGERPRINT_OFFSET: usize = 8;
const FINGERPRINT_LEN: usize = 4;

/// Scans `buffer` from the tail backwards looking for [`MARKER`],
/// delivering each match to `consumer` until it returns `false` or the
/// scan reaches the start of the buffer.
pub fn extract(buffer: &[u8], consumer: &mut dyn FnMut(&DiveRecord) -> bool) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    let mut previous_offset = buffer.len();
    let mut search_end = buffer.len();

    loop {
        let marker_offset = match find_marker_before(buffer, search_end) {
            Some(off) => off,
            None => return Ok(()),
        };

        if marker_offset + 8 > buffer.len() {
            return Err(Status::DataFormat(
                "dive marker too close to buffer end to hold a length field".into(),
            ));
        }
        let len = u32_le(&buffer[marker_offset + 4..marker_offset + 8]) as usize;
        if len < FINGERPRINT_OFFSET + FINGERPRINT_LEN {
            return Err(Status::DataFormat(format!(
                "dive record at offset {marker_offset} declares length {len}, too short to hold its own header and fingerprint"
            )));
        }
        if marker_offset + len > previous_offset {
            return Err(Status::DataFormat(format!(
                "dive record at offset {marker_offset} (len {len}) overlaps the next-newer record at {previous_offset}"
            )));
        }
        if marker_offset + len > buffer.len() {
            return Err(Status::DataFormat(format!(
                "dive record at offset {marker_offset} (len {len}) runs past the end of the buffer"
            )));
        }

        let fp_len = FINGERPRINT_LEN;
        let record = DiveRecord {
            bytes: buffer[marker_offset..marker_offset + len].to_vec(),
            fingerprint_offset: FINGERPRINT_OFFSET,
            fingerprint_len: fp_len,
        };

        let keep_going = consumer(&record);
        if !keep_going {
            return Ok(());
        }

        previous_offset = marker_offset;
        search_end = marker_offset;
    }
}

/// Finds the start offset of the last occurrence of [`MARKER`] that ends
/// at or before `before` (exclusive upper bound on the search window).
/// Record lengths are not guaranteed to be a multiple of the marker's
/// width, so this steps one byte at a time rather than by `MARKER`'s
/// length — otherwise a record whose length isn't a multiple of 4 would
/// shift every older marker off the stride this scan tests.
fn find_marker_before(buffer: &[u8], before: usize) -> Option<usize> {
    if before < 4 {
        return None;
    }
    let mut i = before as isize - 4;
    while i >= 0 {
        let idx = i as usize;
        if buffer[idx..idx + 4] == MARKER {
            return Some(idx);
        }
        i -= 1;
    }
    None
}
