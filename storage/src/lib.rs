//! Flash storage and named partitions.
//!
//! Two layers: a pair of raw device traits (`ReadFlash`, `Flash`) describing
//! one flash device, and a `PartitionTable` of named fixed regions on top of
//! it.  Everything above this crate works in partition-relative offsets;
//! absolute device offsets are computed only here.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::cell::RefCell;

/// Largest number of entries a partition table can hold.
pub const MAX_PARTITIONS: usize = 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    NotAligned,
    OutOfBounds,
    /// Two table entries claim the same device range.
    Overlap,
    /// Two table entries claim the same name.
    Duplicate,
    NotFound,
    /// Attempt to program a cell that has not been erased.
    NotErased,
    /// The backing device reported a fault.
    Device,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Read only interface into flash.
pub trait ReadFlash {
    /// Read alignment and size multiple.  1 for every device used here.
    fn read_size(&self) -> usize;
    fn capacity(&self) -> usize;
    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()>;
}

/// Flash that can also be programmed and erased.
pub trait Flash: ReadFlash {
    /// Write alignment and size multiple.
    fn write_size(&self) -> usize;
    /// Erase alignment and size multiple (the sector size).
    fn erase_size(&self) -> usize;

    /// Erase `[from, to)`.  Both bounds must be sector aligned.
    fn erase(&mut self, from: usize, to: usize) -> Result<()>;
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Check that `[offset, offset+length)` lies within `capacity` and respects
/// `align`.  Shared by the device implementations; the traits themselves do
/// not enforce it.
pub fn check_span(capacity: usize, align: usize, offset: usize, length: usize) -> Result<()> {
    if length > capacity || offset > capacity - length {
        return Err(Error::OutOfBounds);
    }
    if offset % align != 0 || length % align != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}

pub fn check_read<T: ReadFlash>(flash: &T, offset: usize, length: usize) -> Result<()> {
    check_span(flash.capacity(), flash.read_size(), offset, length)
}

pub fn check_write<T: Flash>(flash: &T, offset: usize, length: usize) -> Result<()> {
    check_span(flash.capacity(), flash.write_size(), offset, length)
}

pub fn check_erase<T: Flash>(flash: &T, from: usize, to: usize) -> Result<()> {
    if from > to {
        return Err(Error::OutOfBounds);
    }
    check_span(flash.capacity(), flash.erase_size(), from, to - from)
}

/// A named, fixed region of the device.  Laid out at configuration time,
/// immutable afterwards.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Partition {
    name: &'static str,
    offset: usize,
    len: usize,
}

impl Partition {
    pub const fn new(name: &'static str, offset: usize, len: usize) -> Partition {
        Partition { name, offset, len }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Base offset on the backing device.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn check_range(part: &Partition, offset: usize, length: usize) -> Result<()> {
    if length > part.len || offset > part.len - length {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

/// The partition table: one flash device plus the named regions on it.
///
/// The device sits in a `RefCell` so that several users (a receiver sink, the
/// verify pass, the copy loop) can hold the table at once; the single
/// threaded, run-to-completion model keeps every inner borrow brief.
#[derive(Debug)]
pub struct PartitionTable<D> {
    dev: RefCell<D>,
    parts: heapless::Vec<Partition, MAX_PARTITIONS>,
}

impl<D> PartitionTable<D> {
    /// Look up a partition by its well-known name.
    pub fn find(&self, name: &str) -> Result<&Partition> {
        self.parts.iter().find(|p| p.name == name).ok_or(Error::NotFound)
    }

    /// All partitions, in table order.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.parts.iter()
    }
}

impl<D: Flash> PartitionTable<D> {
    /// Build a table over `dev`.  The layout is checked once, here: entries
    /// must fit the device, start and end on erase boundaries, not overlap,
    /// and carry unique names.  Per-operation code relies on this.
    pub fn new(dev: D, layout: &[Partition]) -> Result<PartitionTable<D>> {
        let erase = dev.erase_size();
        let capacity = dev.capacity();
        let mut parts: heapless::Vec<Partition, MAX_PARTITIONS> = heapless::Vec::new();
        for part in layout {
            if part.len == 0 || part.offset % erase != 0 || part.len % erase != 0 {
                return Err(Error::NotAligned);
            }
            let end = part.offset.checked_add(part.len).ok_or(Error::OutOfBounds)?;
            if end > capacity {
                return Err(Error::OutOfBounds);
            }
            for prior in parts.iter() {
                if part.name == prior.name {
                    return Err(Error::Duplicate);
                }
                if part.offset < prior.offset + prior.len && prior.offset < end {
                    return Err(Error::Overlap);
                }
            }
            if parts.push(part.clone()).is_err() {
                return Err(Error::OutOfBounds);
            }
        }
        Ok(PartitionTable {
            dev: RefCell::new(dev),
            parts,
        })
    }

    pub fn write(&self, part: &Partition, offset: usize, bytes: &[u8]) -> Result<()> {
        check_range(part, offset, bytes.len())?;
        self.dev.borrow_mut().write(part.offset + offset, bytes)
    }

    /// Erase `[from, to)` within the partition.
    pub fn erase(&self, part: &Partition, from: usize, to: usize) -> Result<()> {
        if from > to || to > part.len {
            return Err(Error::OutOfBounds);
        }
        self.dev.borrow_mut().erase(part.offset + from, part.offset + to)
    }

    /// Erase the whole partition.
    pub fn erase_all(&self, part: &Partition) -> Result<()> {
        self.erase(part, 0, part.len)
    }
}

impl<D: ReadFlash> PartitionTable<D> {
    pub fn read(&self, part: &Partition, offset: usize, buf: &mut [u8]) -> Result<()> {
        check_range(part, offset, buf.len())?;
        self.dev.borrow_mut().read(part.offset + offset, buf)
    }
}
