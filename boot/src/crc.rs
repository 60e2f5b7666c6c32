//! Checksum engines.
//!
//! Two checks guard two different things: a CRC-32 over the whole image
//! decides whether an update may be applied, and a CRC-16 over each packet
//! decides whether that packet is acknowledged.  The CRC-32 is the usual
//! reflected 0xEDB88320 kind, table driven; the table is built at compile
//! time.  The CRC-16 is CCITT 0x1021 with a zero start and no final XOR,
//! as the XMODEM 'C' handshake calls for.

const CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut crc = n as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[n] = crc;
        n += 1;
    }
    table
}

/// Streaming CRC-32 accumulator.  Chunk boundaries do not matter: any
/// split of the same bytes folds to the same checksum.
#[derive(Clone)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub fn new() -> Crc32 {
        Crc32 { state: 0xffff_ffff }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            let index = ((self.state ^ byte as u32) & 0xff) as usize;
            self.state = (self.state >> 8) ^ CRC32_TABLE[index];
        }
    }

    pub fn finalize(self) -> u32 {
        self.state ^ 0xffff_ffff
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Crc32::new()
    }
}

/// Whole-buffer convenience form.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(bytes);
    crc.finalize()
}

/// Packet check.  Computed over payload bytes only and carried big-endian
/// on the wire.
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

#[cfg(test)]
mod tests {
    use super::{crc16, crc32, Crc32};

    #[test]
    fn known_answers() {
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc16(b"123456789"), 0x31c3);
        assert_eq!(crc16(b""), 0);
    }

    #[test]
    fn streaming_matches_whole_buffer() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let whole = crc32(&data);
        for split in [1usize, 7, 128, 512, 999] {
            let mut crc = Crc32::new();
            for chunk in data.chunks(split) {
                crc.update(chunk);
            }
            assert_eq!(crc.finalize(), whole, "split {}", split);
        }
    }

    #[test]
    fn agrees_with_the_crc_crate() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let reference = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
        assert_eq!(crc32(data), reference.checksum(data));
        let reference = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
        assert_eq!(crc16(data), reference.checksum(data));
    }

    #[test]
    fn single_bit_flips_change_crc16() {
        let mut payload = [0u8; 128];
        payload[17] = 0x5a;
        let clean = crc16(&payload);
        for bit in 0..8 {
            payload[40] ^= 1 << bit;
            assert_ne!(crc16(&payload), clean, "bit {}", bit);
            payload[40] ^= 1 << bit;
        }
    }
}
