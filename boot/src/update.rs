//! The staged update transaction.
//!
//! An update never touches the application partition until the staged
//! copy in the download partition has been checksummed twice: once as
//! it streamed in, and once re-read out of flash, with the operator's
//! expected value gating the whole thing.  Any failure before the
//! apply step leaves the running application exactly as it was.

use core::fmt::Write;

use storage::{Flash, Partition, PartitionTable, ReadFlash};

use crate::crc::Crc32;
use crate::serial::{read_line, Console, Serial};
use crate::sink::PartitionSink;
use crate::{xmodem, ymodem, Error};

/// Transfer protocol used for the staging download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Xmodem,
    Ymodem,
}

/// How long the operator has to type the expected checksum.
const PROMPT_TIMEOUT_MS: u32 = 15_000;

/// Read/program granularity when copying between partitions.
const COPY_CHUNK: usize = 512;

/// A progress line is printed each time this many bytes go by.
const PROGRESS_MASK: usize = 0x3fff;

/// Which step of an update failed, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// Preparing the download partition failed.
    Stage(storage::Error),
    /// The serial transfer did not complete.
    Transfer(Error),
    /// The sender finished without transferring any data.
    Empty,
    /// No usable checksum arrived at the prompt.
    Prompt,
    /// The operator's checksum disagrees with the staged image.
    Mismatch { expected: u32, staged: u32 },
    /// Re-reading the staged image out of flash failed.
    Verify(storage::Error),
    /// Erasing or programming the application partition failed.
    Apply(storage::Error),
}

/// What a completed update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    /// Bytes staged and copied into the application partition.
    pub bytes: usize,
    /// Checksum of those bytes as re-read from the staging area.
    pub crc32: u32,
}

/// Receive an image into the download partition, verify it against the
/// operator's checksum, and copy it over the application.
pub fn run<S: Serial, D: Flash>(
    serial: &mut S,
    parts: &PartitionTable<D>,
    protocol: Protocol,
) -> Result<UpdateReport, UpdateError> {
    let download = parts.find("download").map_err(UpdateError::Stage)?;
    let app = parts.find("app").map_err(UpdateError::Stage)?;
    parts.erase_all(download).map_err(UpdateError::Stage)?;

    let mut sink = PartitionSink::new(parts, download);
    let (total, info) = match protocol {
        Protocol::Xmodem => {
            let total = xmodem::receive(serial, &mut sink).map_err(UpdateError::Transfer)?;
            (total, None)
        }
        Protocol::Ymodem => {
            let (info, total) = ymodem::receive(serial, &mut sink).map_err(UpdateError::Transfer)?;
            (total, Some(info))
        }
    };
    let streamed = sink.into_crc();
    if total == 0 {
        return Err(UpdateError::Empty);
    }

    let mut out = Console::new(serial);
    let _ = write!(out, "\nReceived {} bytes into '{}'.\n", total, download.name());
    if let Some(info) = &info {
        if !info.name.is_empty() {
            let _ = write!(out, "File '{}', {} bytes announced.\n", info.name.as_str(), info.size);
        }
    }
    let _ = write!(out, "Enter image CRC32: ");

    let mut line = [0u8; 32];
    let taken = read_line(serial, &mut line, PROMPT_TIMEOUT_MS);
    let expected = parse_crc_literal(&line[..taken]).ok_or(UpdateError::Prompt)?;

    let staged = reread_crc(parts, download, total).map_err(UpdateError::Verify)?;
    if staged != streamed {
        // Flash handed back different bytes than were programmed.
        return Err(UpdateError::Verify(storage::Error::Device));
    }
    if expected != staged {
        return Err(UpdateError::Mismatch { expected, staged });
    }

    let mut out = Console::new(serial);
    let _ = write!(out, "CRC OK. Applying update...\n");
    parts.erase_all(app).map_err(UpdateError::Apply)?;
    copy_partition(serial, parts, download, app, total).map_err(UpdateError::Apply)?;
    let mut out = Console::new(serial);
    let _ = write!(out, "Update applied: {} bytes.\n", total);

    Ok(UpdateReport {
        bytes: total,
        crc32: staged,
    })
}

/// Copy `len` bytes between partitions, printing occasional progress.
/// The destination range must already be erased.
pub(crate) fn copy_partition<S: Serial, D: Flash>(
    serial: &mut S,
    parts: &PartitionTable<D>,
    from: &Partition,
    to: &Partition,
    len: usize,
) -> storage::Result<()> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut written = 0;
    while written < len {
        let take = COPY_CHUNK.min(len - written);
        parts.read(from, written, &mut buf[..take])?;
        parts.write(to, written, &buf[..take])?;
        written += take;
        if (written & PROGRESS_MASK) == 0 {
            let mut out = Console::new(serial);
            let _ = write!(out, "{}/{}\n", written, len);
        }
    }
    Ok(())
}

/// Checksum the first `len` bytes of a partition as flash reports them
/// now, independent of anything computed while they streamed in.
fn reread_crc<D: ReadFlash>(
    parts: &PartitionTable<D>,
    part: &Partition,
    len: usize,
) -> storage::Result<u32> {
    let mut crc = Crc32::new();
    let mut buf = [0u8; COPY_CHUNK];
    let mut offset = 0;
    while offset < len {
        let take = COPY_CHUNK.min(len - offset);
        parts.read(part, offset, &mut buf[..take])?;
        crc.update(&buf[..take]);
        offset += take;
    }
    Ok(crc.finalize())
}

/// Parse the operator's checksum: `0x`/`0X` prefixed hex, or decimal.
fn parse_crc_literal(line: &[u8]) -> Option<u32> {
    let text = core::str::from_utf8(line).ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u32>().ok()
    }
}
