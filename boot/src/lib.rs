//! Serial boot loader core.
//!
//! The pieces of a boot stage that decides between running the resident
//! application and taking a replacement image over the serial line: the
//! XMODEM/YMODEM receivers, checksum engines, the staged update
//! transaction over named flash partitions, and the menu that drives it
//! all.  Everything here is hardware free; a board supplies the serial
//! transport, the flash device, and the final jump.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod crc;
pub mod image;
pub mod menu;
pub mod serial;
pub mod sink;
pub mod update;
pub mod xmodem;
pub mod ymodem;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The far end stopped cooperating and the transfer was called off.
    /// Quiet line reads count toward the same retry budget as framing
    /// trouble, so a dead line ends up here too.
    Cancelled,
    /// A storage operation failed underneath the transfer.
    Storage(storage::Error),
}

impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Storage(e)
    }
}

/// The hand-off into the application.  The implementation must have
/// quiesced every peripheral it owns before jumping: interrupts off,
/// vector table remapped, stack reloaded.  Nothing of the loader
/// survives the call.
pub trait Launcher {
    fn launch(&mut self, stack_top: u32, reset: u32) -> !;
}
