//! Reset-time boot decision and the operator menu.
//!
//! On reset the stay-in-boot pin is sampled for a short window; one
//! asserted sample is enough to hold the device in the menu, otherwise
//! a structurally valid application is launched straight away.  The
//! menu itself is a single-key loop over the serial console, and every
//! path out of it to the application goes through the same validity
//! gate.

use core::fmt::Write;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::InputPin;

use storage::{Flash, PartitionTable, ReadFlash};

use crate::image::{self, ValidityWindows, Vectors};
use crate::serial::{Console, Serial};
use crate::update::{self, Protocol, UpdateError};
use crate::{Error, Launcher};

/// Knobs for the reset decision and the menu loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    /// Address windows an application's vectors must land in.
    pub windows: ValidityWindows,
    /// Keypress wait before an unattended launch is attempted.
    pub menu_timeout_ms: u32,
    /// How long the stay-in-boot pin is sampled at reset.
    pub stay_window_ms: u32,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            windows: ValidityWindows::default(),
            menu_timeout_ms: 15_000,
            stay_window_ms: 100,
        }
    }
}

/// True as soon as the pin reads asserted at any point in the window;
/// a pin that stays released, or cannot be read at all, lets the
/// window lapse into the launch path.
pub fn should_stay_in_boot<P, T>(pin: &P, delay: &mut T, window_ms: u32) -> bool
where
    P: InputPin,
    T: DelayMs<u32>,
{
    let mut waited = 0;
    loop {
        if pin.is_low().unwrap_or(false) {
            return true;
        }
        if waited >= window_ms {
            return false;
        }
        delay.delay_ms(10);
        waited += 10;
    }
}

/// What reset should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand control to the application at these vectors.
    Launch(Vectors),
    /// Stay here and talk to the operator.
    Menu,
}

/// The reset-time decision: pin first, then the validity gate.
pub fn startup_decision<D, P, T>(
    parts: &PartitionTable<D>,
    pin: &P,
    delay: &mut T,
    config: &BootConfig,
) -> Decision
where
    D: ReadFlash,
    P: InputPin,
    T: DelayMs<u32>,
{
    if should_stay_in_boot(pin, delay, config.stay_window_ms) {
        return Decision::Menu;
    }
    match launchable(parts, config) {
        Some(vectors) => Decision::Launch(vectors),
        None => Decision::Menu,
    }
}

/// One pass through the menu loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    /// Keep showing the menu.
    Continue,
    /// Leave the loop and start the application.
    Launch(Vectors),
}

/// Wait for one key and act on it.  Silence past the configured
/// timeout retries the unattended launch instead.
pub fn menu_step<S: Serial, D: Flash>(
    serial: &mut S,
    parts: &PartitionTable<D>,
    config: &BootConfig,
) -> MenuOutcome {
    let key = match serial.receive_byte(config.menu_timeout_ms) {
        Ok(key) => key,
        Err(_) => return try_launch(serial, parts, config),
    };
    match key {
        b'0' => print_menu(serial),
        b'1' => run_update(serial, parts, Protocol::Xmodem),
        b'2' => run_update(serial, parts, Protocol::Ymodem),
        b'3' => restore_backup(serial, parts),
        b'4' => show_info(serial, parts, config),
        b'5' => erase_app(serial, parts),
        b'6' => return try_launch(serial, parts, config),
        _ => {}
    }
    MenuOutcome::Continue
}

/// The whole boot flow.  Never returns; every exit is through the
/// launcher.
pub fn run<S, D, P, T, L>(
    serial: &mut S,
    parts: &PartitionTable<D>,
    pin: &P,
    delay: &mut T,
    config: &BootConfig,
    launcher: &mut L,
) -> !
where
    S: Serial,
    D: Flash,
    P: InputPin,
    T: DelayMs<u32>,
    L: Launcher,
{
    {
        let mut out = Console::new(serial);
        let _ = write!(out, "\nboot {}\n", env!("CARGO_PKG_VERSION"));
    }
    if let Decision::Launch(vectors) = startup_decision(parts, pin, delay, config) {
        launcher.launch(vectors.stack_top, vectors.reset);
    }
    print_menu(serial);
    loop {
        if let MenuOutcome::Launch(vectors) = menu_step(serial, parts, config) {
            launcher.launch(vectors.stack_top, vectors.reset);
        }
    }
}

/// Vectors to jump to, if the application passes the validity gate.
fn launchable<D: ReadFlash>(parts: &PartitionTable<D>, config: &BootConfig) -> Option<Vectors> {
    let app = parts.find("app").ok()?;
    let vectors = image::vectors(parts, app).ok()?;
    if vectors.within(&config.windows) {
        Some(vectors)
    } else {
        None
    }
}

fn try_launch<S: Serial, D: ReadFlash>(
    serial: &mut S,
    parts: &PartitionTable<D>,
    config: &BootConfig,
) -> MenuOutcome {
    match launchable(parts, config) {
        Some(vectors) => MenuOutcome::Launch(vectors),
        None => {
            let mut out = Console::new(serial);
            let _ = write!(out, "No valid application to start.\n");
            MenuOutcome::Continue
        }
    }
}

pub fn print_menu<S: Serial>(serial: &mut S) {
    let mut out = Console::new(serial);
    let _ = write!(
        out,
        "\n==== Boot Menu ====\n\
         0: Show this menu\n\
         1: Update application over XMODEM\n\
         2: Update application over YMODEM\n\
         3: Restore the factory image\n\
         4: Show device info\n\
         5: Erase the application\n\
         6: Start the application\n\
         > "
    );
}

fn run_update<S: Serial, D: Flash>(serial: &mut S, parts: &PartitionTable<D>, protocol: Protocol) {
    {
        let mut out = Console::new(serial);
        let name = match protocol {
            Protocol::Xmodem => "XMODEM",
            Protocol::Ymodem => "YMODEM",
        };
        let _ = write!(out, "Start your {} sender now.\n", name);
    }
    let result = update::run(serial, parts, protocol);
    let mut out = Console::new(serial);
    match result {
        Ok(report) => {
            let _ = write!(
                out,
                "Update complete: {} bytes, CRC32 {:08x}.\n",
                report.bytes, report.crc32
            );
        }
        Err(UpdateError::Stage(err)) => {
            let _ = write!(out, "Could not prepare the download partition: {:?}.\n", err);
        }
        Err(UpdateError::Transfer(Error::Cancelled)) => {
            let _ = write!(out, "Transfer cancelled.\n");
        }
        Err(UpdateError::Transfer(err)) => {
            let _ = write!(out, "Transfer failed: {:?}.\n", err);
        }
        Err(UpdateError::Empty) => {
            let _ = write!(out, "Sender closed without any data.\n");
        }
        Err(UpdateError::Prompt) => {
            let _ = write!(out, "No checksum entered. Update abandoned.\n");
        }
        Err(UpdateError::Mismatch { expected, staged }) => {
            let _ = write!(
                out,
                "CRC mismatch: entered {:08x}, staged image is {:08x}. Application untouched.\n",
                expected, staged
            );
        }
        Err(UpdateError::Verify(err)) => {
            let _ = write!(
                out,
                "Could not re-read the staged image: {:?}. Application untouched.\n",
                err
            );
        }
        Err(UpdateError::Apply(err)) => {
            let _ = write!(
                out,
                "Apply failed: {:?}. The application partition may be partial.\n",
                err
            );
        }
    }
}

fn restore_backup<S: Serial, D: Flash>(serial: &mut S, parts: &PartitionTable<D>) {
    let result = restore(serial, parts);
    let mut out = Console::new(serial);
    match result {
        Ok(bytes) => {
            let _ = write!(out, "Restore complete: {} bytes.\n", bytes);
        }
        Err(err) => {
            let _ = write!(
                out,
                "Restore failed: {:?}. The application partition may be partial.\n",
                err
            );
        }
    }
}

/// Copy the factory image over the application.  The copy is not
/// checksummed; the backup partition is trusted as programmed.
fn restore<S: Serial, D: Flash>(
    serial: &mut S,
    parts: &PartitionTable<D>,
) -> storage::Result<usize> {
    let basesys = parts.find("basesys")?;
    let app = parts.find("app")?;
    let len = basesys.len().min(app.len());
    {
        let mut out = Console::new(serial);
        let _ = write!(out, "Restoring the factory image...\n");
    }
    parts.erase_all(app)?;
    update::copy_partition(serial, parts, basesys, app, len)?;
    Ok(len)
}

fn show_info<S: Serial, D: ReadFlash>(
    serial: &mut S,
    parts: &PartitionTable<D>,
    config: &BootConfig,
) {
    let launch = launchable(parts, config);
    let mut out = Console::new(serial);
    let _ = write!(out, "boot {}\n", env!("CARGO_PKG_VERSION"));
    for part in parts.partitions() {
        let _ = write!(
            out,
            "  {:10} {:#010x} + {:#x}\n",
            part.name(),
            part.offset(),
            part.len()
        );
    }
    match launch {
        Some(vectors) => {
            let _ = write!(
                out,
                "Application: valid, stack {:#010x}, reset {:#010x}.\n",
                vectors.stack_top, vectors.reset
            );
        }
        None => {
            let _ = write!(out, "Application: not valid.\n");
        }
    }
}

fn erase_app<S: Serial, D: Flash>(serial: &mut S, parts: &PartitionTable<D>) {
    let result = parts.find("app").and_then(|app| parts.erase_all(app));
    let mut out = Console::new(serial);
    match result {
        Ok(()) => {
            let _ = write!(out, "Application partition erased.\n");
        }
        Err(err) => {
            let _ = write!(out, "Erase failed: {:?}.\n", err);
        }
    }
}
