//! Image generation.
//!
//! Builds deterministic firmware-like payloads for tests: a body of seeded
//! noise behind a two-word vector table, with the checksum computed here,
//! bit by bit, so the loader's table-driven CRC has something independent
//! to agree with.

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use anyhow::{bail, Result};

pub struct GeneratedImage {
    pub data: Vec<u8>,
    /// CRC-32 of `data`.
    pub crc32: u32,
}

pub struct GenBuilder {
    /// Total size of the image in bytes.
    size: usize,
    /// Seed for the PRNG.
    seed: u64,
    /// Initial stack pointer placed in the first vector.
    stack_top: u32,
    /// Reset handler address placed in the second vector.
    reset: u32,
}

impl Default for GenBuilder {
    fn default() -> Self {
        GenBuilder {
            size: 2_893,
            seed: 1,
            stack_top: 0x2000_4000,
            reset: 0x0800_0411,
        }
    }
}

impl GenBuilder {
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    /// Place the given words in the vector table.  The defaults look like a
    /// plausible application; override them to make an image that should
    /// fail the launch checks.
    pub fn vectors(&mut self, stack_top: u32, reset: u32) -> &mut Self {
        self.stack_top = stack_top;
        self.reset = reset;
        self
    }

    pub fn build(&self) -> Result<GeneratedImage> {
        if self.size < 8 {
            bail!("image of {} bytes cannot hold a vector table", self.size);
        }
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut data = vec![0u8; self.size];
        rng.fill_bytes(&mut data);

        data[0..4].copy_from_slice(&self.stack_top.to_le_bytes());
        data[4..8].copy_from_slice(&self.reset.to_le_bytes());

        let crc32 = crc32(&data);
        Ok(GeneratedImage { data, crc32 })
    }
}

/// Reflected CRC-32 over the 0xEDB88320 polynomial, one bit at a time.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffff_u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let lsb = crc & 1;
            crc >>= 1;
            if lsb != 0 {
                crc ^= 0xedb8_8320;
            }
        }
    }
    !crc
}
