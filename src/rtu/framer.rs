//! Gap-based RTU frame delimiter with CRC-anchored recovery (C2).
//!
//! Grounded on the teacher's blocking serial read loop
//! (`protocol/daemon/serial_daemon.rs`'s `compute_gap`/idle-sleep pattern and
//! `protocol/modbus/frame.rs`'s incremental `read_until`), generalized to the
//! CRC-scan recovery this spec requires instead of trusting the gap alone.

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::crc::verify;

/// Per-read cap, a defence against driver/USB blips that hand back
/// unexpectedly large chunks.
pub const MAX_READ_CHUNK: usize = 4096;
/// If the buffer grows past this with no CRC-valid frame inside it, it is
/// discarded outright (runaway guard).
pub const RUNAWAY_BUFFER_CAP: usize = 8192;
/// Minimum inter-frame gap, regardless of how short 3.5 character times would be.
pub const GAP_FLOOR: Duration = Duration::from_millis(20);

/// Wall-time to transmit one serial character at the configured line settings.
pub fn char_time(baud: u32, data_bits: u8, stop_bits: u8, parity_bit: bool) -> Duration {
    let bits_per_char = 1 + data_bits as u64 + stop_bits as u64 + u64::from(parity_bit);
    let baud = baud.max(1) as u64;
    Duration::from_secs_f64(bits_per_char as f64 / baud as f64)
}

/// Stateful frame assembler: owns the accumulation buffer and the clock used
/// by the inter-frame gap heuristic. One instance per serial port.
pub struct Framer {
    buf: Vec<u8>,
    last_byte: Option<Instant>,
    gap: Duration,
    char_time: Duration,
}

impl Framer {
    pub fn new(char_time: Duration) -> Self {
        Self {
            buf: Vec::new(),
            last_byte: None,
            gap: gap_for(char_time),
            char_time,
        }
    }

    /// Discard any buffered bytes and forget the gap clock (I3: bus cleanup).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.last_byte = None;
    }

    /// Reset the gap heuristic's "last byte" clock to `now` so that bytes
    /// arriving right after a fresh write are not mistaken for a stale,
    /// already-idle run (I3).
    pub fn mark_fresh(&mut self, now: Instant) {
        self.last_byte = Some(now);
    }

    /// Read one complete, CRC-valid frame from `source`, waiting at most
    /// `timeout`. Returns `Ok(None)` on timeout with nothing recoverable,
    /// `Ok(Some(frame))` on success, `Err` only for a genuine I/O error
    /// (not a read timeout) from `source`.
    ///
    /// `source` must be non-blocking or, like every port this broker opens,
    /// configured with its own short per-read timeout (§4.2) — this method
    /// polls it in a loop and enforces `timeout` itself, so a `source` whose
    /// `read` blocks for longer than `timeout` would stall the gap check and
    /// the deadline both.
    pub fn read_frame(
        &mut self,
        source: &mut dyn Read,
        timeout: Duration,
    ) -> std::io::Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let idle_sleep = self.char_time.mul_f64(0.5).max(Duration::from_millis(1));

        loop {
            if self.pull_available(source)? {
                self.last_byte = Some(Instant::now());
            }

            if let Some(last) = self.last_byte {
                if !self.buf.is_empty() && last.elapsed() >= self.gap {
                    if let Some(frame) = self.take_valid_range() {
                        return Ok(Some(frame));
                    }
                }
            }

            if Instant::now() >= deadline {
                if let Some(frame) = self.take_valid_range() {
                    return Ok(Some(frame));
                }
                if self.buf.len() > RUNAWAY_BUFFER_CAP {
                    self.buf.clear();
                    self.last_byte = None;
                }
                return Ok(None);
            }

            std::thread::sleep(idle_sleep);
        }
    }

    fn take_valid_range(&mut self) -> Option<Vec<u8>> {
        let (i, j) = find_valid_range(&self.buf)?;
        let frame = self.buf[i..j].to_vec();
        self.buf.drain(0..j);
        Some(frame)
    }

    /// Append whatever is immediately available from `source`, capped at
    /// [`MAX_READ_CHUNK`]. Returns `Ok(true)` if any bytes were appended.
    /// A read timeout/would-block is "no data yet", not an error.
    fn pull_available(&mut self, source: &mut dyn Read) -> std::io::Result<bool> {
        let mut chunk = [0u8; MAX_READ_CHUNK];
        match source.read(&mut chunk) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn gap_for(char_time: Duration) -> Duration {
    char_time.mul_f64(3.5).max(GAP_FLOOR)
}

/// Find the leftmost, then shortest, contiguous byte range of at least 4
/// bytes whose CRC validates.
fn find_valid_range(buf: &[u8]) -> Option<(usize, usize)> {
    let n = buf.len();
    for i in 0..n {
        for j in (i + 4)..=n {
            if verify(&buf[i..j]) {
                return Some((i, j));
            }
        }
    }
    None
}
