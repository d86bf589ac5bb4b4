//! 6820 PIA as wired in the Apple 1: port A is the keyboard, port B the
//! display. Registers are atomics so the terminal side can poke them while
//! the CPU thread is running.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Keyboard control value after the strobe has been consumed.
pub const KBD_READY: u8 = 0x27;
/// Keyboard control value a terminal writes when a key is waiting.
pub const KBD_STROBE: u8 = 0xA7;
/// Bit in the display control register that enables output.
pub const DISPLAY_ENABLE: u8 = 0x04;
/// Data register bit meaning "a byte is waiting".
pub const DATA_READY: u8 = 0x80;

#[derive(Debug)]
pub struct Pia {
    keyboard_data: AtomicU8,
    keyboard_control: AtomicU8,
    display_data: AtomicU8,
    display_control: AtomicU8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiaSnapshot {
    pub keyboard_data: u8,
    pub keyboard_control: u8,
    pub display_data: u8,
    pub display_control: u8,
}

impl Pia {
    pub fn new() -> Self {
        Pia {
            keyboard_data: AtomicU8::new(0x80),
            keyboard_control: AtomicU8::new(0),
            display_data: AtomicU8::new(0),
            display_control: AtomicU8::new(0),
        }
    }

    pub fn reset(&self) {
        self.keyboard_control.store(0, Ordering::Relaxed);
        self.display_control.store(0, Ordering::Relaxed);
        self.display_data.store(0, Ordering::Relaxed);
        self.keyboard_data.store(0x80, Ordering::Relaxed);
    }

    /// The first write after reset always lands as `KBD_READY`, whatever
    /// the CPU wrote.
    pub fn write_keyboard_control(&self, value: u8) {
        let _ = self
            .keyboard_control
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current == 0 { KBD_READY } else { value })
            });
    }

    pub fn write_keyboard_data(&self, value: u8) {
        self.keyboard_data.store(value, Ordering::Relaxed);
    }

    pub fn read_keyboard_control(&self) -> u8 {
        self.keyboard_control.load(Ordering::Acquire)
    }

    /// Reading the data register re-arms the handshake.
    pub fn read_keyboard_data(&self) -> u8 {
        self.keyboard_control.store(KBD_READY, Ordering::Release);
        self.keyboard_data.load(Ordering::Relaxed)
    }

    pub fn write_display_control(&self, value: u8) {
        self.display_control.store(value, Ordering::Release);
    }

    /// Dropped unless the display has been enabled through its control
    /// register.
    pub fn write_display_data(&self, value: u8) {
        if self.display_control.load(Ordering::Acquire) & DISPLAY_ENABLE == 0 {
            return;
        }
        self.display_data.store(value, Ordering::Release);
    }

    pub fn read_display_control(&self) -> u8 {
        self.display_control.load(Ordering::Acquire)
    }

    pub fn read_display_data(&self) -> u8 {
        self.display_data.load(Ordering::Acquire)
    }

    /// Side-effect free view of all four registers.
    pub fn snapshot(&self) -> PiaSnapshot {
        PiaSnapshot {
            keyboard_data: self.keyboard_data.load(Ordering::Relaxed),
            keyboard_control: self.keyboard_control.load(Ordering::Relaxed),
            display_data: self.display_data.load(Ordering::Relaxed),
            display_control: self.display_control.load(Ordering::Relaxed),
        }
    }

    pub fn restore(&self, state: &PiaSnapshot) {
        self.keyboard_data.store(state.keyboard_data, Ordering::Relaxed);
        self.keyboard_control.store(state.keyboard_control, Ordering::Relaxed);
        self.display_data.store(state.display_data, Ordering::Relaxed);
        self.display_control.store(state.display_control, Ordering::Relaxed);
    }
}

impl Default for Pia {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_state() {
        let pia = Pia::new();
        pia.write_display_control(0xA7);
        pia.write_display_data(0xC1);
        pia.write_keyboard_data(0x41);
        pia.reset();

        let state = pia.snapshot();
        assert_eq!(state.keyboard_data, 0x80);
        assert_eq!(state.keyboard_control, 0);
        assert_eq!(state.display_data, 0);
        assert_eq!(state.display_control, 0);
    }

    #[test]
    fn test_keyboard_control_forced_when_idle() {
        let pia = Pia::new();
        pia.write_keyboard_control(0xA7);
        assert_eq!(pia.read_keyboard_control(), KBD_READY);

        // Once out of idle, writes are stored verbatim
        pia.write_keyboard_control(0xA7);
        assert_eq!(pia.read_keyboard_control(), 0xA7);
        pia.write_keyboard_control(0x00);
        assert_eq!(pia.read_keyboard_control(), 0x00);
    }

    #[test]
    fn test_reading_keyboard_data_rearms_strobe() {
        let pia = Pia::new();
        pia.write_keyboard_control(0x00);
        pia.write_keyboard_control(KBD_STROBE);
        pia.write_keyboard_data(0xC1);

        assert_eq!(pia.read_keyboard_control(), KBD_STROBE);
        assert_eq!(pia.read_keyboard_data(), 0xC1);
        assert_eq!(pia.read_keyboard_control(), KBD_READY);
    }

    #[test]
    fn test_display_data_requires_enable() {
        let pia = Pia::new();
        pia.write_display_data(0xC1);
        assert_eq!(pia.read_display_data(), 0);

        pia.write_display_control(DISPLAY_ENABLE);
        pia.write_display_data(0xC1);
        assert_eq!(pia.read_display_data(), 0xC1);

        pia.write_display_control(0);
        pia.write_display_data(0x42);
        assert_eq!(pia.read_display_data(), 0xC1);
    }

    #[test]
    fn test_snapshot_restore() {
        let pia = Pia::new();
        let state = PiaSnapshot {
            keyboard_data: 0xD2,
            keyboard_control: 0xA7,
            display_data: 0x0D,
            display_control: 0xA7,
        };
        pia.restore(&state);
        assert_eq!(pia.snapshot(), state);
    }
}
