//! Serial transport seam.
//!
//! The loader needs very little from the wire: blocking bounded reads and
//! fire-and-forget writes.  A board implements [`Serial`] over whatever
//! UART it owns; everything else here is provided on top of it.

use core::fmt;

/// Largest chunk a transport has to take in one call.
pub const MAX_CHUNK: usize = 512;

/// Nothing, or not enough, arrived in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

pub trait Serial {
    /// Fill `buf` (at most [`MAX_CHUNK`] bytes) before `timeout_ms` runs
    /// out.  A short read is a timeout and its partial data is discarded.
    fn receive_into(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), Timeout>;

    /// Send one byte, blocking until the transport takes it.
    fn send_byte(&mut self, byte: u8);

    fn receive_byte(&mut self, timeout_ms: u32) -> Result<u8, Timeout> {
        let mut byte = [0u8; 1];
        self.receive_into(&mut byte, timeout_ms)?;
        Ok(byte[0])
    }

    fn send(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.send_byte(byte);
        }
    }

    /// Fill all of `buf`, chunked at [`MAX_CHUNK`], each chunk on its own
    /// `chunk_timeout_ms` clock.  Returns on the first short chunk.
    fn receive_exact(&mut self, buf: &mut [u8], chunk_timeout_ms: u32) -> Result<(), Timeout> {
        for chunk in buf.chunks_mut(MAX_CHUNK) {
            self.receive_into(chunk, chunk_timeout_ms)?;
        }
        Ok(())
    }
}

/// Operator text over the transport.  Lines end CR LF on the wire.
pub struct Console<'a, S> {
    serial: &'a mut S,
}

impl<'a, S: Serial> Console<'a, S> {
    pub fn new(serial: &'a mut S) -> Console<'a, S> {
        Console { serial }
    }
}

impl<'a, S: Serial> fmt::Write for Console<'a, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            if byte == b'\n' {
                self.serial.send_byte(b'\r');
            }
            self.serial.send_byte(byte);
        }
        Ok(())
    }
}

/// Read one line of operator input into `line`.  CR is ignored, LF ends
/// the line, and a full buffer ends it early.  The deadline is
/// approximate, assembled from 10 ms polls.  Returns the bytes collected,
/// which is everything seen so far when the deadline passes first.
pub fn read_line<S: Serial>(serial: &mut S, line: &mut [u8], timeout_ms: u32) -> usize {
    let mut len = 0;
    let mut waited = 0;
    while len < line.len() {
        match serial.receive_byte(10) {
            Ok(b'\r') => continue,
            Ok(b'\n') => break,
            Ok(byte) => {
                line[len] = byte;
                len += 1;
            }
            Err(Timeout) => {
                waited += 10;
                if waited > timeout_ms {
                    break;
                }
            }
        }
    }
    len
}
