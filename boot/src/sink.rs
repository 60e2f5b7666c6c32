//! Image sinks.
//!
//! A receiver does not care where accepted bytes land.  During a staged
//! update they go straight to the download partition; tests and RAM-bound
//! callers use a slice.  Appends truncate at capacity rather than
//! overflow, and a full sink ends a transfer successfully.

use storage::{Flash, Partition, PartitionTable};

use crate::crc::Crc32;

/// Destination for accepted payload bytes.
pub trait ImageSink {
    /// Room left, in bytes.
    fn remaining(&self) -> usize;

    /// Take as much of `chunk` as fits, returning how many bytes were
    /// taken.
    fn append(&mut self, chunk: &[u8]) -> storage::Result<usize>;
}

/// A RAM sink over a caller-provided buffer.
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> SliceSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> SliceSink<'a> {
        SliceSink { buf, len: 0 }
    }

    /// Bytes taken so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl ImageSink for SliceSink<'_> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    fn append(&mut self, chunk: &[u8]) -> storage::Result<usize> {
        let take = chunk.len().min(self.remaining());
        self.buf[self.len..self.len + take].copy_from_slice(&chunk[..take]);
        self.len += take;
        Ok(take)
    }
}

/// Writes accepted bytes through a partition at strictly increasing
/// offsets, folding every written byte into a running CRC-32 in write
/// order.  The partition must have been erased for this transaction
/// already, and the transfer's chunk sizes must respect the device's
/// program alignment.
pub struct PartitionSink<'a, D> {
    parts: &'a PartitionTable<D>,
    part: &'a Partition,
    written: usize,
    crc: Crc32,
}

impl<'a, D: Flash> PartitionSink<'a, D> {
    pub fn new(parts: &'a PartitionTable<D>, part: &'a Partition) -> PartitionSink<'a, D> {
        PartitionSink {
            parts,
            part,
            written: 0,
            crc: Crc32::new(),
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Checksum of everything written.
    pub fn into_crc(self) -> u32 {
        self.crc.finalize()
    }
}

impl<'a, D: Flash> ImageSink for PartitionSink<'a, D> {
    fn remaining(&self) -> usize {
        self.part.len() - self.written
    }

    fn append(&mut self, chunk: &[u8]) -> storage::Result<usize> {
        let take = chunk.len().min(self.remaining());
        if take == 0 {
            return Ok(0);
        }
        self.parts.write(self.part, self.written, &chunk[..take])?;
        self.crc.update(&chunk[..take]);
        self.written += take;
        Ok(take)
    }
}
