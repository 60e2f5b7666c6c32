//! Flash layouts
//!
//! Geometries for the kinds of parts the loader is expected to run against.
//! The update paths program in chunks of 128 bytes and up, so every program
//! unit here divides 128.

use crate::Result;
use crate::SimFlash;

/// The configuration of a single flash device.
pub struct AreaLayout {
    pub read_size: usize,
    pub write_size: usize,
    pub erase_size: usize,
    pub sectors: usize,
}

impl AreaLayout {
    pub fn build(&self) -> Result<SimFlash> {
        SimFlash::new(
            self.read_size,
            self.write_size,
            self.erase_size,
            self.sectors,
        )
    }

    pub fn capacity(&self) -> usize {
        self.erase_size * self.sectors
    }
}

/// STM32F1-style.
/// On-chip flash with uniform 2k sectors, programmed a halfword at a time.
/// This is the geometry of the shipped board support.
pub static STM32F1: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 2,
    erase_size: 2 * 1024,
    sectors: 256,
};

/// K64-style.
/// Small uniform sectors with a wider program unit.
pub static K64: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 8,
    erase_size: 4 * 1024,
    sectors: 128,
};

/// External SPI-NOR style.
/// Byte programmable with 4k sectors.
pub static SPI_NOR: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 1,
    erase_size: 4 * 1024,
    sectors: 64,
};

/// Deliberately small, to keep unit tests quick.
pub static TINY: AreaLayout = AreaLayout {
    read_size: 1,
    write_size: 1,
    erase_size: 512,
    sectors: 64,
};

/// All of the device geometries.
pub static ALL_LAYOUTS: [&'static AreaLayout; 4] = [&STM32F1, &K64, &SPI_NOR, &TINY];

/// An iterator yielding a freshly built device of each geometry.
pub fn all_devices() -> impl Iterator<Item = Result<SimFlash>> {
    ALL_LAYOUTS.iter().map(|layout| layout.build())
}
