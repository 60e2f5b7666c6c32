//! YMODEM receive.
//!
//! XMODEM with an opening act: block zero names the file and declares its
//! length before any data moves.  The block is parsed once, acknowledged,
//! and answered with a fresh 'C' to start the data phase, which then runs
//! under the XMODEM rules unchanged.  While block zero is still
//! outstanding, trouble on the line is answered by asking for the start
//! again rather than by NAK.

use heapless::String;

use crate::serial::Serial;
use crate::sink::ImageSink;
use crate::xmodem::{self, Frame, ACK, CAN, CRC_MODE, MAX_RETRIES};
use crate::{Error, Result};

/// What block zero announced.  The declared size is reported to the
/// caller, not enforced against the bytes that follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Sender's file name, truncated to fit.
    pub name: String<64>,
    /// Declared length in bytes.
    pub size: usize,
}

/// Block zero carries a NUL-terminated name, then a decimal size string
/// ended by NUL or space.  No NUL at all, or a declared size that does
/// not fit `usize`, makes the block malformed.
fn parse_file_info(payload: &[u8]) -> Option<FileInfo> {
    let name_end = payload.iter().position(|&b| b == 0)?;

    let mut name = String::new();
    for &byte in &payload[..name_end] {
        if name.push(byte as char).is_err() {
            break;
        }
    }

    let mut size: usize = 0;
    for &byte in &payload[name_end + 1..] {
        match byte {
            b'0'..=b'9' => {
                size = size
                    .checked_mul(10)?
                    .checked_add((byte - b'0') as usize)?;
            }
            _ => break,
        }
    }

    Some(FileInfo { name, size })
}

/// Receive one file.  Returns what block zero announced alongside the
/// bytes actually appended to the sink.
pub fn receive<S: Serial, K: ImageSink>(serial: &mut S, sink: &mut K) -> Result<(FileInfo, usize)> {
    let mut payload = [0u8; 1024];
    let mut retries = 0;

    serial.send_byte(CRC_MODE);

    let info = loop {
        match xmodem::receive_frame(serial, 0, None, &mut payload) {
            Ok(Frame::Data(size)) => {
                if let Some(info) = parse_file_info(&payload[..size]) {
                    serial.send_byte(ACK);
                    serial.send_byte(CRC_MODE);
                    break info;
                }
                // Malformed block zero: ask for the start over.
                retries += 1;
                serial.send_byte(CRC_MODE);
                if retries >= MAX_RETRIES {
                    serial.send_byte(CAN);
                    serial.send_byte(CAN);
                    return Err(Error::Cancelled);
                }
            }
            Ok(Frame::Done) => {
                // EOT before any file: an empty session.
                return Ok((
                    FileInfo {
                        name: String::new(),
                        size: 0,
                    },
                    0,
                ));
            }
            Ok(Frame::Duplicate) | Err(_) => {
                retries += 1;
                serial.send_byte(CRC_MODE);
                if retries >= MAX_RETRIES {
                    serial.send_byte(CAN);
                    serial.send_byte(CAN);
                    return Err(Error::Cancelled);
                }
            }
        }
    };

    // Data packets run from sequence 1 under the XMODEM rules.  A re-sent
    // block zero lands there as a duplicate and is absorbed.
    let total = xmodem::run(serial, sink)?;
    Ok((info, total))
}
