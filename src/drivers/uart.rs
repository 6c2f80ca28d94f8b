//! PL011 UART Driver for QEMU virt machine
//!
//! Serial console behind fd 0/fd 1 and the kernel log sink.
//!
//! # Memory Map (QEMU virt)
//! - Base address: 0x0900_0000
//! - Register size: 0x1000 bytes
//!
//! # Security Considerations
//! - Unsafe code is confined to the two MMIO accessors
//! - Uses spinlock for thread-safe access

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use super::Console;

/// QEMU virt machine PL011 UART base address
pub const UART_BASE: usize = 0x0900_0000;

/// PL011 Register offsets
mod regs {
    /// Data Register - read/write data
    pub const DR: usize = 0x00;
    /// Flag Register - status flags
    pub const FR: usize = 0x18;
}

/// Flag Register bits
mod flags {
    /// Receive FIFO empty
    pub const RXFE: u32 = 1 << 4;
    /// Transmit FIFO full
    pub const TXFF: u32 = 1 << 5;
}

/// PL011 UART driver
pub struct Uart {
    base: usize,
    initialized: bool,
}

impl Uart {
    /// Create a new UART instance (not yet initialized)
    pub const fn new(base: usize) -> Self {
        Self {
            base,
            initialized: false,
        }
    }

    /// Initialize the UART
    ///
    /// # Safety
    /// - Must only be called once
    /// - `base` must be the mapped PL011 register block
    pub unsafe fn init(&mut self) {
        // PL011 is already initialized by QEMU, just mark as ready
        self.initialized = true;
    }

    fn read_flags(&self) -> u32 {
        // SAFETY: base is the PL011 block, validated by init()
        unsafe { core::ptr::read_volatile((self.base + regs::FR) as *const u32) }
    }

    /// Write a single byte to the UART
    fn write_byte(&self, byte: u8) {
        if !self.initialized {
            return;
        }

        while self.read_flags() & flags::TXFF != 0 {
            core::hint::spin_loop();
        }

        // SAFETY: The write is to a known MMIO register
        unsafe {
            core::ptr::write_volatile((self.base + regs::DR) as *mut u32, byte as u32);
        }
    }

    /// Read one byte if the receive FIFO holds one.
    fn try_read_byte(&self) -> Option<u8> {
        if !self.initialized || self.read_flags() & flags::RXFE != 0 {
            return None;
        }

        // SAFETY: The read is from a known MMIO register; the low byte is data
        let word = unsafe { core::ptr::read_volatile((self.base + regs::DR) as *const u32) };
        Some((word & 0xFF) as u8)
    }

    /// Write raw bytes, translating `\n` to `\r\n`.
    pub fn write_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Global UART instance protected by spinlock
pub static UART: Mutex<Uart> = Mutex::new(Uart::new(UART_BASE));

/// [`Console`] over the global UART.
///
/// [`Uart::init`] must have run on [`UART`] first: until then output is
/// dropped and `get_byte` never returns.
pub struct UartConsole;

impl Console for UartConsole {
    fn put_bytes(&self, bytes: &[u8]) {
        UART.lock().write_bytes(bytes);
    }

    fn get_byte(&self) -> u8 {
        loop {
            // Drop the lock between polls so output can make progress
            if let Some(byte) = UART.lock().try_read_byte() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }
}

/// `log` sink writing `[LEVEL] target: message` lines to the UART.
pub struct UartLogger {
    level: LevelFilter,
}

impl UartLogger {
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut uart = UART.lock();
        let _ = writeln!(uart, "[{}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}
