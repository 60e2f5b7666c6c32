//! Wire frames
//!
//! Builders for the byte streams a remote sender would put on the line.
//! The CRC here is computed on its own, bit by bit, rather than through the
//! loader's engine, so a defect in either implementation shows up as a
//! disagreement between the two ends.

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x18;
pub const CRC_REQ: u8 = b'C';

/// Sender-side padding for a short final chunk.
pub const PAD: u8 = 0x1a;

/// CRC-16/XMODEM: polynomial 0x1021, zero init, nothing reflected.
pub fn crc16(payload: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in payload {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Frame a data packet.  The payload length picks the header: 128 bytes
/// travel under SOH, 1024 under STX.
pub fn data_packet(seq: u8, payload: &[u8]) -> Vec<u8> {
    let header = match payload.len() {
        128 => SOH,
        1024 => STX,
        len => panic!("payload of {} bytes fits no packet type", len),
    };
    let mut frame = Vec::with_capacity(payload.len() + 5);
    frame.push(header);
    frame.push(seq);
    frame.push(!seq);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc16(payload).to_be_bytes());
    frame
}

/// The YMODEM block zero: file name and decimal size, each NUL terminated,
/// in a 128 byte payload.
pub fn file_info_packet(name: &str, size: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(128);
    payload.extend_from_slice(name.as_bytes());
    payload.push(0);
    payload.extend_from_slice(size.to_string().as_bytes());
    payload.push(0);
    assert!(payload.len() <= 128, "file info does not fit a packet");
    payload.resize(128, 0);
    data_packet(0, &payload)
}

/// Split `data` into packet payloads of `chunk` bytes, padding the tail.
pub fn packetize(data: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk)
        .map(|piece| {
            let mut payload = piece.to_vec();
            payload.resize(chunk, PAD);
            payload
        })
        .collect()
}

/// The whole data phase of a send: packets from sequence 1, then EOT.
pub fn session(data: &[u8], chunk: usize) -> Vec<u8> {
    let mut wire = Vec::new();
    let mut seq = 1u8;
    for payload in packetize(data, chunk) {
        wire.extend_from_slice(&data_packet(seq, &payload));
        seq = seq.wrapping_add(1);
    }
    wire.push(EOT);
    wire
}

/// A full YMODEM send: block zero, then the data phase.
pub fn ymodem_session(name: &str, data: &[u8], chunk: usize) -> Vec<u8> {
    let mut wire = file_info_packet(name, data.len());
    wire.extend_from_slice(&session(data, chunk));
    wire
}

/// Flip one byte of a frame.
pub fn corrupt(frame: &mut [u8], index: usize) {
    frame[index] ^= 0xff;
}
