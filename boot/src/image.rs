//! Application image checks.
//!
//! Validity here is structural only: the two words at the base of the
//! partition have to look like a stack pointer into RAM and a reset
//! vector into flash.  Nothing is executed and nothing is checksummed;
//! a structurally valid image can still be stale or broken firmware.
//! The check is recomputed from storage on every call, never cached.

use core::ops::Range;

use storage::{Partition, PartitionTable, ReadFlash};

use crate::Result;

/// Allow println for diagnostics in 'std' builds, and just make it vanish
/// when we are no_std.
#[cfg(not(any(feature = "std", test)))]
macro_rules! println {
    ($($_e:expr),+) => { {} };
}

/// Address windows a plausible image must point into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityWindows {
    /// Where the initial stack pointer may land.
    pub ram: Range<u32>,
    /// Where the reset handler may land.
    pub flash: Range<u32>,
}

impl Default for ValidityWindows {
    /// Windows for the STM32F103 part this ships on: 64k of SRAM and
    /// 512k of flash at the usual bases.
    fn default() -> Self {
        ValidityWindows {
            ram: 0x2000_0000..0x2001_0000,
            flash: 0x0800_0000..0x0808_0000,
        }
    }
}

/// The two words at the base of an image, in memory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vectors {
    pub stack_top: u32,
    pub reset: u32,
}

impl Vectors {
    /// Structural plausibility against the windows.  Both ranges are
    /// half-open; an address exactly at an upper bound is outside.
    pub fn within(&self, windows: &ValidityWindows) -> bool {
        windows.ram.contains(&self.stack_top) && windows.flash.contains(&self.reset)
    }
}

/// Read the vector words from the head of `part`.
pub fn vectors<D: ReadFlash>(parts: &PartitionTable<D>, part: &Partition) -> Result<Vectors> {
    let mut head = [0u8; 8];
    parts.read(part, 0, &mut head)?;
    Ok(Vectors {
        stack_top: u32::from_le_bytes([head[0], head[1], head[2], head[3]]),
        reset: u32::from_le_bytes([head[4], head[5], head[6], head[7]]),
    })
}

/// The launch gate: does the head of `part` look like an application?
pub fn app_is_valid<D: ReadFlash>(
    parts: &PartitionTable<D>,
    part: &Partition,
    windows: &ValidityWindows,
) -> Result<bool> {
    let head = vectors(parts, part)?;
    if !head.within(windows) {
        println!("implausible vectors: {:x?}", head);
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use storage::{Partition, PartitionTable};

    use super::{app_is_valid, vectors, ValidityWindows, Vectors};

    fn flash_with_head(stack_top: u32, reset: u32) -> PartitionTable<simflash::SimFlash> {
        let mut head = [0u8; 8];
        head[..4].copy_from_slice(&stack_top.to_le_bytes());
        head[4..].copy_from_slice(&reset.to_le_bytes());
        let mut flash = simflash::layouts::TINY.build().unwrap();
        flash.install(&head, 0).unwrap();
        PartitionTable::new(flash, &[Partition::new("app", 0, 2048)]).unwrap()
    }

    #[test]
    fn plausible_vectors_pass() {
        let parts = flash_with_head(0x2000_0500, 0x0800_1000);
        let app = parts.find("app").unwrap();
        assert!(app_is_valid(&parts, app, &ValidityWindows::default()).unwrap());
    }

    #[test]
    fn stack_pointer_outside_ram_fails() {
        let parts = flash_with_head(0x3000_0000, 0x0800_1000);
        let app = parts.find("app").unwrap();
        assert!(!app_is_valid(&parts, app, &ValidityWindows::default()).unwrap());
    }

    #[test]
    fn upper_bounds_are_exclusive() {
        let parts = flash_with_head(0x2000_0500, 0x0808_0000);
        let app = parts.find("app").unwrap();
        assert!(!app_is_valid(&parts, app, &ValidityWindows::default()).unwrap());
        let parts = flash_with_head(0x2001_0000, 0x0800_1000);
        let app = parts.find("app").unwrap();
        assert!(!app_is_valid(&parts, app, &ValidityWindows::default()).unwrap());
    }

    #[test]
    fn vector_words_read_little_endian() {
        let parts = flash_with_head(0x2000_1234, 0x0800_5678);
        let app = parts.find("app").unwrap();
        assert_eq!(
            vectors(&parts, app).unwrap(),
            Vectors {
                stack_top: 0x2000_1234,
                reset: 0x0800_5678,
            }
        );
    }

    #[test]
    fn erased_partition_is_invalid() {
        let flash = simflash::layouts::TINY.build().unwrap();
        let parts = PartitionTable::new(flash, &[Partition::new("app", 0, 2048)]).unwrap();
        let app = parts.find("app").unwrap();
        // All-ones vectors point nowhere plausible.
        assert!(!app_is_valid(&parts, app, &ValidityWindows::default()).unwrap());
    }
}
