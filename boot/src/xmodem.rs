//! XMODEM receive.
//!
//! The classic framed transfer in its CRC-16 flavor: the receiver opens
//! with 'C', the sender answers with SOH or STX packets carrying a
//! sequence byte, its complement, the payload, and a big-endian CRC-16.
//! Good packets are acknowledged and appended to the sink; anything wrong
//! on the line draws a NAK and another try.  Ten consecutive failures
//! cancel the whole transfer with a double CAN.
//!
//! Storage trouble is different from line trouble: the sink's error is
//! final, cancels the sender, and surfaces to the caller untouched.

use crate::crc::crc16;
use crate::serial::Serial;
use crate::sink::ImageSink;
use crate::{Error, Result};

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x18;
/// 'C': asks the sender for CRC-16 framing.
pub const CRC_MODE: u8 = 0x43;

/// Consecutive line failures tolerated before the transfer is called off.
pub const MAX_RETRIES: u32 = 10;

/// Deadline for each read on the wire.
pub const READ_TIMEOUT_MS: u32 = 1000;

/// One successfully framed arrival.
pub(crate) enum Frame {
    /// An in-order payload of the given length, not yet acknowledged.
    Data(usize),
    /// A retransmit of the previous packet, already acknowledged again.
    Duplicate,
    /// End of transmission, already acknowledged.
    Done,
}

pub(crate) enum FrameError {
    /// The line went quiet mid-frame.
    Timeout,
    /// Framing, sequence, or checksum trouble.
    Broken,
}

/// Read one frame.  `payload` is scratch for the largest packet; on
/// `Frame::Data(n)` its first `n` bytes are the accepted payload.
/// `duplicate_seq` names the already-acknowledged packet a lost ACK makes
/// the sender repeat; `None` while nothing has been acknowledged yet.
pub(crate) fn receive_frame<S: Serial>(
    serial: &mut S,
    expected_seq: u8,
    duplicate_seq: Option<u8>,
    payload: &mut [u8; 1024],
) -> core::result::Result<Frame, FrameError> {
    let header = serial
        .receive_byte(READ_TIMEOUT_MS)
        .map_err(|_| FrameError::Timeout)?;

    let size = match header {
        EOT => {
            serial.send_byte(ACK);
            return Ok(Frame::Done);
        }
        SOH => 128,
        STX => 1024,
        _ => return Err(FrameError::Broken),
    };

    let seq = serial
        .receive_byte(READ_TIMEOUT_MS)
        .map_err(|_| FrameError::Timeout)?;
    let complement = serial
        .receive_byte(READ_TIMEOUT_MS)
        .map_err(|_| FrameError::Timeout)?;
    if seq != !complement {
        return Err(FrameError::Broken);
    }

    // A repeat of the acknowledged packet is drained in full so the line
    // stays aligned; it just is not kept.
    let duplicate = duplicate_seq == Some(seq);
    if !duplicate && seq != expected_seq {
        return Err(FrameError::Broken);
    }

    let body = &mut payload[..size];
    serial
        .receive_exact(body, READ_TIMEOUT_MS)
        .map_err(|_| FrameError::Timeout)?;

    let mut crc = [0u8; 2];
    serial
        .receive_exact(&mut crc, READ_TIMEOUT_MS)
        .map_err(|_| FrameError::Timeout)?;
    if u16::from_be_bytes(crc) != crc16(body) {
        return Err(FrameError::Broken);
    }

    if duplicate {
        serial.send_byte(ACK);
        Ok(Frame::Duplicate)
    } else {
        Ok(Frame::Data(size))
    }
}

/// Receive one image: send the 'C' handshake, then run the data phase
/// from sequence 1.  Returns the bytes appended to the sink.  A full sink
/// and an EOT both end the transfer successfully.
pub fn receive<S: Serial, K: ImageSink>(serial: &mut S, sink: &mut K) -> Result<usize> {
    serial.send_byte(CRC_MODE);
    run(serial, sink)
}

/// The data phase, shared with YMODEM (which opens differently but moves
/// data identically).
pub(crate) fn run<S: Serial, K: ImageSink>(serial: &mut S, sink: &mut K) -> Result<usize> {
    let mut payload = [0u8; 1024];
    let mut seq: u8 = 1;
    let mut retries = 0;
    let mut total = 0;

    while sink.remaining() > 0 {
        match receive_frame(serial, seq, Some(seq.wrapping_sub(1)), &mut payload) {
            Ok(Frame::Done) => return Ok(total),
            Ok(Frame::Duplicate) => {
                retries = 0;
            }
            Ok(Frame::Data(size)) => {
                let taken = match sink.append(&payload[..size]) {
                    Ok(taken) => taken,
                    Err(e) => {
                        serial.send_byte(CAN);
                        serial.send_byte(CAN);
                        return Err(Error::Storage(e));
                    }
                };
                total += taken;
                serial.send_byte(ACK);
                seq = seq.wrapping_add(1);
                retries = 0;
            }
            Err(_) => {
                retries += 1;
                serial.send_byte(NAK);
                if retries >= MAX_RETRIES {
                    serial.send_byte(CAN);
                    serial.send_byte(CAN);
                    return Err(Error::Cancelled);
                }
            }
        }
    }

    Ok(total)
}
