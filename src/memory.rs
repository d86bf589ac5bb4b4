use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{EmulatorError, Result};
use crate::pia::{Pia, DATA_READY};
use crate::rom::RomImages;

pub const MEMORY_SIZE: usize = 0x10000;

// PIA registers, decoded ahead of the RAM/ROM array
pub const KBD: u16 = 0xD010;
pub const KBDCR: u16 = 0xD011;
pub const DSP: u16 = 0xD012;
pub const DSPCR: u16 = 0xD013;

/// Everything below this address is cleared on a memory reset.
pub const RAM_END: u16 = 0xE000;
pub const ROM_PAGE: u16 = 0xFF00;
const EXPANSION_START: u16 = 0x2000;

/// The 64KB address space plus the PIA it decodes.
///
/// Every method takes `&self`: bytes are atomics so the run loop and the
/// terminal side can share one `Memory` through an `Arc` without tearing.
/// Nothing orders accesses across different bytes.
pub struct Memory {
    data: Box<[AtomicU8]>,
    pia: Pia,
    ram8k: AtomicBool,
    write_in_rom: AtomicBool,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            data: (0..MEMORY_SIZE).map(|_| AtomicU8::new(0)).collect(),
            pia: Pia::new(),
            ram8k: AtomicBool::new(false),
            write_in_rom: AtomicBool::new(true),
        }
    }

    pub fn pia(&self) -> &Pia {
        &self.pia
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            KBD => self.pia.read_keyboard_data(),
            KBDCR => self.pia.read_keyboard_control(),
            DSP => self.pia.read_display_data(),
            DSPCR => self.pia.read_display_control(),
            _ => self.data[address as usize].load(Ordering::Relaxed),
        }
    }

    pub fn write(&self, address: u16, value: u8) {
        match address {
            KBD => self.pia.write_keyboard_data(value),
            KBDCR => self.pia.write_keyboard_control(value),
            // CPU stores always raise the "character waiting" bit
            DSP => self.pia.write_display_data(value | DATA_READY),
            DSPCR => self.pia.write_display_control(value),
            _ => {
                if address >= ROM_PAGE && !self.write_in_rom() {
                    return;
                }
                if self.ram8k() && (EXPANSION_START..ROM_PAGE).contains(&address) {
                    return;
                }
                self.data[address as usize].store(value, Ordering::Relaxed);
            }
        }
    }

    // Read a 16-bit value in little-endian format
    pub fn read_u16(&self, address: u16) -> u16 {
        let low = self.read(address) as u16;
        let high = self.read(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    // Write a 16-bit value in little-endian format
    pub fn write_u16(&self, address: u16, value: u16) {
        self.write(address, (value & 0xFF) as u8);
        self.write(address.wrapping_add(1), (value >> 8) as u8);
    }

    /// Copies `data` into the array starting at `start`, bypassing write
    /// protection and the PIA decode. Rejected as a whole if it would run
    /// past 0xFFFF.
    pub fn load_image(&self, data: &[u8], start: u16) -> Result<()> {
        let begin = start as usize;
        if begin + data.len() > MEMORY_SIZE {
            return Err(EmulatorError::OutOfRange { start, len: data.len() });
        }
        for (cell, &byte) in self.data[begin..begin + data.len()].iter().zip(data) {
            cell.store(byte, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Raw copy of the inclusive range `start..=end`.
    pub fn snapshot(&self, start: u16, end: u16) -> Result<Vec<u8>> {
        if start > end {
            return Err(EmulatorError::InvalidRange { start, end });
        }
        Ok(self.data[start as usize..=end as usize]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect())
    }

    /// The whole 64KB image.
    pub fn dump(&self) -> Vec<u8> {
        self.data.iter().map(|cell| cell.load(Ordering::Relaxed)).collect()
    }

    /// Clears RAM below the BASIC ROM and reinstalls the ROM images.
    pub fn reset(&self, roms: &RomImages) -> Result<()> {
        for cell in &self.data[..RAM_END as usize] {
            cell.store(0, Ordering::Relaxed);
        }
        roms.install(self)
    }

    pub fn set_ram8k(&self, enabled: bool) {
        self.ram8k.store(enabled, Ordering::Relaxed);
    }

    /// When set, only the first 8K of RAM (plus the ROM page) is writable.
    pub fn ram8k(&self) -> bool {
        self.ram8k.load(Ordering::Relaxed)
    }

    pub fn set_write_in_rom(&self, enabled: bool) {
        self.write_in_rom.store(enabled, Ordering::Relaxed);
    }

    /// When cleared, the monitor page at 0xFF00 is write protected.
    pub fn write_in_rom(&self) -> bool {
        self.write_in_rom.load(Ordering::Relaxed)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
