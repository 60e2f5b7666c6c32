//! Simulated serial line
//!
//! Counterpart to `simflash` for the transport: a test plays the remote
//! sender from a script while the loader runs its end of the wire for real.
//! Bytes queued ahead of time arrive in order; a silence entry stands for a
//! read interval in which nothing arrived.  Everything the loader transmits
//! is recorded for the test to pick over afterwards.
//!
//! The frames a remote sender would put on the line are built by the
//! [`frames`] module, with its own CRC, so the two ends of the wire stay
//! independent of each other.

use std::collections::VecDeque;

use boot::serial::{Serial, Timeout};

pub mod frames;

enum Event {
    Byte(u8),
    Silence,
}

/// A scripted serial port.
#[derive(Default)]
pub struct SimSerial {
    incoming: VecDeque<Event>,
    sent: Vec<u8>,
    timeouts: Vec<u32>,
}

impl SimSerial {
    pub fn new() -> SimSerial {
        SimSerial::default()
    }

    /// Queue bytes for the loader to receive.
    pub fn feed(&mut self, bytes: &[u8]) -> &mut Self {
        self.incoming.extend(bytes.iter().map(|&b| Event::Byte(b)));
        self
    }

    /// Queue `reads` receive calls that will time out before anything more
    /// arrives.  An exhausted script times out forever.
    pub fn silence(&mut self, reads: usize) -> &mut Self {
        for _ in 0..reads {
            self.incoming.push_back(Event::Silence);
        }
        self
    }

    /// Everything the loader has transmitted, control bytes and text alike.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// The timeout passed to each receive call, in order.
    pub fn requested_timeouts(&self) -> &[u32] {
        &self.timeouts
    }
}

impl Serial for SimSerial {
    fn receive_into(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), Timeout> {
        assert!(buf.len() <= 512, "receive of {} bytes in one chunk", buf.len());
        self.timeouts.push(timeout_ms);
        for slot in buf.iter_mut() {
            match self.incoming.pop_front() {
                Some(Event::Byte(byte)) => *slot = byte,
                Some(Event::Silence) | None => return Err(Timeout),
            }
        }
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) {
        self.sent.push(byte);
    }
}
