//! Simulated flash
//!
//! The loader runs against whatever NOR flash a given microcontroller
//! carries, and those parts differ mostly in their program and erase
//! granularity.  This simulator models the properties the loader actually
//! leans on: sectored erase to an all-ones state, an alignment unit for
//! programming, and the rule that a cell is programmed at most once between
//! erases.  Violations that would be silent bit-decay on real hardware are
//! loud errors here.
//!
//! A single simulated device stands in for the whole chip; a
//! `storage::PartitionTable` divides it up the same way the linker script
//! does on hardware.  Geometries for common parts live in [`layouts`], and
//! [`gen`] builds deterministic firmware-like images to load into them.
//!
//! Every operation can also be armed to start failing after a budget of
//! successes, which is how the tests model a device fault in the middle of
//! a longer sequence.

use storage::{Flash, ReadFlash};

pub use storage::{Error, Result};

pub mod gen;
pub mod layouts;

/// A memory-backed NOR device.
#[derive(Debug)]
pub struct SimFlash {
    read_size: usize,
    write_size: usize,
    erase_size: usize,
    mem: Vec<u8>,
    /// Tracks which cells have been programmed since their last erase.
    programmed: Vec<bool>,
    reads_left: Option<usize>,
    writes_left: Option<usize>,
    erases_left: Option<usize>,
}

impl SimFlash {
    /// Build a device of `sectors` uniform sectors.  The program unit must
    /// divide the sector size; reads are always byte granular.
    pub fn new(read_size: usize, write_size: usize, erase_size: usize, sectors: usize) -> Result<SimFlash> {
        if read_size != 1 || write_size == 0 || sectors == 0 {
            return Err(Error::NotAligned);
        }
        if erase_size == 0 || erase_size % write_size != 0 {
            return Err(Error::NotAligned);
        }
        let capacity = erase_size.checked_mul(sectors).ok_or(Error::OutOfBounds)?;
        Ok(SimFlash {
            read_size,
            write_size,
            erase_size,
            mem: vec![0xff; capacity],
            programmed: vec![false; capacity],
            reads_left: None,
            writes_left: None,
            erases_left: None,
        })
    }

    /// Erase the covering sectors and program `data` at `offset`, padding
    /// the tail out to the program unit.  `offset` itself must be program
    /// aligned.  This is the test fixture's way of preloading a partition.
    pub fn install(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let from = offset - offset % self.erase_size;
        let to = offset + data.len();
        let to = to + (self.erase_size - to % self.erase_size) % self.erase_size;
        self.erase(from, to)?;
        let unaligned = data.len() % self.write_size;
        if unaligned == 0 {
            self.write(offset, data)
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len() + self.write_size - unaligned, 0xff);
            self.write(offset, &padded)
        }
    }

    /// Allow `ok` more successful reads, then fail each one after.
    pub fn fail_after_reads(&mut self, ok: usize) {
        self.reads_left = Some(ok);
    }

    /// Allow `ok` more successful writes, then fail each one after.
    pub fn fail_after_writes(&mut self, ok: usize) {
        self.writes_left = Some(ok);
    }

    /// Allow `ok` more successful erases, then fail each one after.
    pub fn fail_after_erases(&mut self, ok: usize) {
        self.erases_left = Some(ok);
    }

    fn spend(budget: &mut Option<usize>) -> Result<()> {
        match budget {
            Some(0) => Err(Error::Device),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl ReadFlash for SimFlash {
    fn read_size(&self) -> usize {
        self.read_size
    }

    fn capacity(&self) -> usize {
        self.mem.len()
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()> {
        storage::check_read(self, offset, bytes.len())?;
        Self::spend(&mut self.reads_left)?;
        bytes.copy_from_slice(&self.mem[offset..offset + bytes.len()]);
        Ok(())
    }
}

impl Flash for SimFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase_size(&self) -> usize {
        self.erase_size
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<()> {
        storage::check_erase(self, from, to)?;
        Self::spend(&mut self.erases_left)?;
        self.mem[from..to].fill(0xff);
        self.programmed[from..to].fill(false);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        storage::check_write(self, offset, bytes.len())?;
        Self::spend(&mut self.writes_left)?;
        let end = offset + bytes.len();
        if self.programmed[offset..end].iter().any(|&cell| cell) {
            return Err(Error::NotErased);
        }
        self.mem[offset..end].copy_from_slice(bytes);
        self.programmed[offset..end].fill(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use storage::{Error, Flash, ReadFlash};

    use super::SimFlash;

    /// 8 sectors of 512 bytes, halfword programmed.
    fn small() -> SimFlash {
        SimFlash::new(1, 2, 512, 8).unwrap()
    }

    #[test]
    fn geometry_is_validated() {
        assert_eq!(SimFlash::new(1, 0, 512, 8).unwrap_err(), Error::NotAligned);
        assert_eq!(SimFlash::new(1, 3, 512, 8).unwrap_err(), Error::NotAligned);
        assert_eq!(SimFlash::new(2, 2, 512, 8).unwrap_err(), Error::NotAligned);
        assert_eq!(SimFlash::new(1, 2, 512, 0).unwrap_err(), Error::NotAligned);
    }

    #[test]
    fn fresh_device_reads_erased() {
        let mut flash = small();
        assert_eq!(flash.capacity(), 4096);
        let mut buf = [0u8; 16];
        flash.read(4080, &mut buf).unwrap();
        assert_eq!(buf, [0xff; 16]);
    }

    #[test]
    fn writes_read_back() {
        let mut flash = small();
        flash.write(512, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        flash.read(512, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn cells_program_once() {
        let mut flash = small();
        flash.write(0, &[0xaa, 0xbb]).unwrap();
        assert_eq!(flash.write(0, &[0xcc, 0xdd]).unwrap_err(), Error::NotErased);
        // The old contents survive the rejected write.
        let mut buf = [0u8; 2];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xaa, 0xbb]);
    }

    #[test]
    fn erase_frees_cells_for_reprogramming() {
        let mut flash = small();
        flash.write(0, &[1, 1]).unwrap();
        flash.erase(0, 512).unwrap();
        let mut buf = [0u8; 2];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xff, 0xff]);
        flash.write(0, &[2, 2]).unwrap();
    }

    #[test]
    fn alignment_is_enforced() {
        let mut flash = small();
        assert_eq!(flash.write(1, &[0, 0]).unwrap_err(), Error::NotAligned);
        assert_eq!(flash.write(0, &[0]).unwrap_err(), Error::NotAligned);
        assert_eq!(flash.erase(0, 100).unwrap_err(), Error::NotAligned);
        assert_eq!(flash.erase(8, 512).unwrap_err(), Error::NotAligned);
    }

    #[test]
    fn bounds_are_enforced() {
        let mut flash = small();
        let mut buf = [0u8; 8];
        assert_eq!(flash.read(4092, &mut buf).unwrap_err(), Error::OutOfBounds);
        assert_eq!(flash.write(4096, &[0, 0]).unwrap_err(), Error::OutOfBounds);
        assert_eq!(flash.erase(3584, 4608).unwrap_err(), Error::OutOfBounds);
    }

    #[test]
    fn install_pads_unaligned_lengths() {
        let mut flash = small();
        flash.install(&[7; 5], 512).unwrap();
        let mut buf = [0u8; 6];
        flash.read(512, &mut buf).unwrap();
        assert_eq!(buf, [7, 7, 7, 7, 7, 0xff]);
    }

    #[test]
    fn install_erases_what_it_covers() {
        let mut flash = small();
        flash.write(512, &[1, 1]).unwrap();
        // Reprogramming the same cells is fine because install erases first.
        flash.install(&[2; 4], 512).unwrap();
        let mut buf = [0u8; 4];
        flash.read(512, &mut buf).unwrap();
        assert_eq!(buf, [2, 2, 2, 2]);
    }

    #[test]
    fn injected_faults_fire_after_budget() {
        let mut flash = small();
        flash.fail_after_writes(1);
        flash.write(0, &[1, 1]).unwrap();
        assert_eq!(flash.write(2, &[2, 2]).unwrap_err(), Error::Device);
        // Reads have their own budget.
        let mut buf = [0u8; 2];
        flash.read(0, &mut buf).unwrap();
        flash.fail_after_erases(0);
        assert_eq!(flash.erase(0, 512).unwrap_err(), Error::Device);
    }
}
