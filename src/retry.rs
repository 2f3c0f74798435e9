// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! Retry/backoff wrapper around a single request/response exchange, and
//! the cooperative cancellation flag drivers observe at suspension
//! boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Result, Status};
use crate::framing;
use crate::transport::{Direction, Transport};

/// Maximum number of consecutive `Protocol`/`Timeout` failures a
/// [`transfer`] call will absorb before giving up (spec §4.3).
pub const MAX_RETRIES: u32 = 4;

/// Inter-retry backoff: sleep this long before purging input and
/// retrying (spec §4.3 step 4).
pub const RETRY_SLEEP_MS: u32 = 100;

/// Overridable retry/backoff parameters. [`RetryPolicy::default`]
/// reproduces [`MAX_RETRIES`]/[`RETRY_SLEEP_MS`]; a caller that knows
/// its link is slower or faster than the reference device can hand a
/// driver's `open` a different policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_sleep_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_sleep_ms: RETRY_SLEEP_MS,
        }
    }
}

/// Cooperative cancellation flag shared between a driver and whatever
/// external code (a different thread, a UI cancel button) wants to abort
/// it. The driver only observes the flag at suspension boundaries: before
/// each [`transfer`] and between dump chunks; in-flight transport calls
/// are never interrupted.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sends `cmd` in full, reads back exactly `expected_len` bytes, passes
/// them through `decode`, and returns the decoded payload.
///
/// Retries up to `policy.max_retries` times when the read or `decode`
/// fails with `Protocol` or `Timeout`: each retry sleeps
/// `policy.retry_sleep_ms`, purges buffered input, and re-sends `cmd`
/// (writes are never retried once partially accepted by the transport;
/// a write failure is returned immediately with no retry). Raising
/// `cancel` before or during the loop short-circuits the next
/// observation with `Status::Cancelled` without issuing a transport
/// read.
pub fn transfer_with(
    transport: &mut dyn Transport,
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    cmd: &[u8],
    expected_len: usize,
    decode: impl Fn(&[u8]) -> Result<Vec<u8>>,
) -> Result<Vec<u8>> {
    if cancel.is_cancelled() {
        return Err(Status::Cancelled);
    }

    let mut attempt = 0u32;
    loop {
        transport.write(cmd)?;

        let mut buf = vec![0u8; expected_len];
        let outcome = transport.read(&mut buf).and_then(|_| decode(&buf));

        match outcome {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_retryable() => {
                attempt += 1;
                if attempt > policy.max_retries {
                    warn!("transfer: giving up after {attempt} attempts: {e}");
                    return Err(e);
                }
                debug!(
                    "transfer: retryable failure ({e}), attempt {attempt}/{}",
                    policy.max_retries
                );
                transport.sleep(policy.retry_sleep_ms);
                transport.purge(Direction::INPUT)?;
                if cancel.is_cancelled() {
                    return Err(Status::Cancelled);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// [`transfer_with`] using the stream family's ASCII-hex envelope as the
/// decoder (spec §4.4): validates framing/CRC and returns the payload.
pub fn transfer(
    transport: &mut dyn Transport,
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    cmd: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>> {
    transfer_with(transport, cancel, policy, cmd, expected_len, |buf| {
        framing::decode_envelope(buf)
    })
}

/// [`transfer_with`] for the enumeration family's binary protocol: the
/// bytes read are already the payload, no framing to validate.
pub fn transfer_raw(
    transport: &mut dyn Transport,
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    cmd: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>> {
    transfer_with(transport, cancel, policy, cmd, expected_len, |buf| Ok(buf.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn valid_frame() -> Vec<u8> {
        framing::encode_envelope(&[0xAA, 0xBB])
    }

    #[test]
    fn retry_then_success() {
        let mut t = MockTransport::new();
        // Two malformed frames (bad CRC), then a valid one.
        t.push_read(b"{FFFF0000}".to_vec());
        t.push_read(b"{FFFF0000}".to_vec());
        let good = valid_frame();
        let len = good.len();
        t.push_read(good.clone());

        let cancel = CancellationToken::new();
        let result = transfer(&mut t, &cancel, &RetryPolicy::default(), b"cmd", len);
        assert!(result.is_ok());
        assert_eq!(t.purge_calls().len(), 2);
    }

    #[test]
    fn retry_exhaustion_returns_protocol() {
        let mut t = MockTransport::new();
        let good = valid_frame();
        let len = good.len();
        for _ in 0..10 {
            t.push_read(b"{FFFF0000}".to_vec());
        }
        let cancel = CancellationToken::new();
        let result = transfer(&mut t, &cancel, &RetryPolicy::default(), b"cmd", len);
        assert!(matches!(result, Err(Status::Protocol(_))));
        // MAX_RETRIES retries after the first attempt => MAX_RETRIES + 1 reads consumed.
        assert_eq!(t.pending_reads(), 10 - (MAX_RETRIES as usize + 1));
    }

    #[test]
    fn cancellation_short_circuits_before_any_read() {
        let mut t = MockTransport::new();
        t.push_read(valid_frame());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transfer(&mut t, &cancel, &RetryPolicy::default(), b"cmd", 1);
        assert!(matches!(result, Err(Status::Cancelled)));
        assert_eq!(t.pending_reads(), 1, "no read should have been consumed");
        assert!(t.written().is_empty(), "no write should have been issued");
    }

    #[test]
    fn write_failure_is_not_retried() {
        let mut t = MockTransport::new();
        t.fail_next_write();
        t.push_read(valid_frame());
        let cancel = CancellationToken::new();
        let result = transfer(&mut t, &cancel, &RetryPolicy::default(), b"cmd", 1);
        assert!(matches!(result, Err(Status::Io(_))));
        assert_eq!(t.pending_reads(), 1, "write failure must not consume a read");
    }
}
