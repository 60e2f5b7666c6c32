#![no_main]
#![no_std]

#[cfg(feature = "semihosting")]
use panic_semihosting as _;

#[cfg(feature = "rtt")]
use defmt_rtt as _;
#[cfg(feature = "rtt")]
use panic_probe as _;

use cortex_m_rt::entry;
use embedded_hal::serial::{Read, Write};
use nb::block;
use stm32f1xx_hal as hal;

use hal::flash::{FlashSize, FlashWriter, SectorSize};
use hal::pac;
use hal::prelude::*;
use hal::serial::{Config, Rx, Serial, Tx};

use boot::menu::BootConfig;
use boot::serial::Timeout;
use storage::{Partition, PartitionTable};

const FLASH_BASE: usize = 0x0800_0000;
const FLASH_SIZE: usize = 0x8_0000;
const APP_OFFSET: usize = 0x1_0000;

/// Flash map of the 512k part.  The loader itself owns the unnamed
/// 64k at the front; "env" is reserved for application parameters.
const LAYOUT: [Partition; 4] = [
    Partition::new("app", APP_OFFSET, 0x3_0000),
    Partition::new("download", 0x4_0000, 0x3_0000),
    Partition::new("basesys", 0x7_0000, 0xf000),
    Partition::new("env", 0x7_f000, 0x1000),
];

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = pac::Peripherals::take().unwrap();

    let mut flash = dp.FLASH.constrain();
    let rcc = dp.RCC.constrain();
    let clocks = rcc
        .cfgr
        .use_hse(8.MHz())
        .sysclk(72.MHz())
        .pclk1(36.MHz())
        .freeze(&mut flash.acr);

    let mut afio = dp.AFIO.constrain();
    let mut gpioa = dp.GPIOA.split();

    let tx_pin = gpioa.pa9.into_alternate_push_pull(&mut gpioa.crh);
    let rx_pin = gpioa.pa10;
    let serial = Serial::new(
        dp.USART1,
        (tx_pin, rx_pin),
        &mut afio.mapr,
        Config::default().baudrate(115_200.bps()),
        &clocks,
    );
    let (tx, rx) = serial.split();
    let mut port = BoardSerial { tx, rx };

    // KEY0, active low, holds the device in the loader.
    let stay = gpioa.pa0.into_pull_up_input(&mut gpioa.crl);
    let mut delay = cp.SYST.delay(&clocks);

    let writer = flash.writer(SectorSize::Sz2K, FlashSize::Sz512K);
    let parts = PartitionTable::new(BoardFlash { writer }, &LAYOUT).unwrap();

    let mut launcher = VectorLauncher {
        table: (FLASH_BASE + APP_OFFSET) as u32,
    };

    boot::menu::run(
        &mut port,
        &parts,
        &stay,
        &mut delay,
        &BootConfig::default(),
        &mut launcher,
    )
}

/// The internal flash array: memory mapped for reads, programmed and
/// erased through the peripheral.
struct BoardFlash<'a> {
    writer: FlashWriter<'a>,
}

impl storage::ReadFlash for BoardFlash<'_> {
    fn read_size(&self) -> usize {
        1
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> storage::Result<()> {
        storage::check_read(self, offset, bytes.len())?;
        let memory = unsafe {
            core::slice::from_raw_parts((FLASH_BASE + offset) as *const u8, bytes.len())
        };
        bytes.copy_from_slice(memory);
        Ok(())
    }
}

impl storage::Flash for BoardFlash<'_> {
    fn write_size(&self) -> usize {
        2
    }

    fn erase_size(&self) -> usize {
        2 * 1024
    }

    fn erase(&mut self, from: usize, to: usize) -> storage::Result<()> {
        storage::check_erase(self, from, to)?;
        let mut page = from;
        while page < to {
            self.writer
                .page_erase(page as u32)
                .map_err(|_| storage::Error::Device)?;
            page += self.erase_size();
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> storage::Result<()> {
        storage::check_write(self, offset, bytes.len())?;
        self.writer
            .write(offset as u32, bytes)
            .map_err(|_| storage::Error::Device)
    }
}

/// Polling interval while waiting for a byte, about a tenth of a
/// millisecond at the 72 MHz system clock.  A byte at 115200 baud
/// lasts most of a tenth of a millisecond, so the poll keeps up.
const POLL_CYCLES: u32 = 7_200;
const POLLS_PER_MS: u32 = 10;

struct BoardSerial {
    tx: Tx<pac::USART1>,
    rx: Rx<pac::USART1>,
}

impl boot::serial::Serial for BoardSerial {
    fn receive_into(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), Timeout> {
        let mut budget = timeout_ms.saturating_mul(POLLS_PER_MS);
        for slot in buf.iter_mut() {
            loop {
                match self.rx.read() {
                    Ok(byte) => {
                        *slot = byte;
                        break;
                    }
                    Err(nb::Error::WouldBlock) => {
                        if budget == 0 {
                            return Err(Timeout);
                        }
                        budget -= 1;
                        cortex_m::asm::delay(POLL_CYCLES);
                    }
                    // Overrun or framing noise; drop it and keep waiting.
                    Err(nb::Error::Other(_)) => {}
                }
            }
        }
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) {
        let _ = block!(self.tx.write(byte));
    }
}

/// Hands the core to the vector table at the application base.
struct VectorLauncher {
    table: u32,
}

impl boot::Launcher for VectorLauncher {
    fn launch(&mut self, _stack_top: u32, _reset: u32) -> ! {
        unsafe {
            cortex_m::interrupt::disable();
            let mut core = cortex_m::Peripherals::steal();
            core.SYST.disable_interrupt();
            core.SYST.disable_counter();
            core.SCB.vtor.write(self.table);
            cortex_m::asm::bootload(self.table as *const u32);
        }
    }
}
