//! Keyboard side of the PIA handshake, plus a queue of pending keystrokes
//! for pasted text and files typed in as if at the keyboard.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use log::info;

use crate::error::{EmulatorError, Result};
use crate::metrics::record_keyboard_byte;
use crate::pia::{Pia, DATA_READY, KBD_READY, KBD_STROBE};
use crate::sync::lock;

/// Maps a host byte to the Apple 1 keyboard code, or `None` if the
/// keyboard can't produce it.
pub fn translate(byte: u8) -> Option<u8> {
    let byte = match byte {
        b'a'..=b'z' => byte & 0x5F,
        b'\n' => b'\r',
        _ => byte,
    };
    if byte < 0x60 {
        Some(byte)
    } else {
        None
    }
}

/// Hands `code` to the CPU: data with bit 7 set, then the strobe.
pub fn inject(pia: &Pia, code: u8) {
    pia.write_keyboard_data(code | DATA_READY);
    pia.write_keyboard_control(KBD_STROBE);
    record_keyboard_byte();
}

#[derive(Debug, Default)]
pub struct Keyboard {
    pending: Mutex<VecDeque<u8>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `text` for typing. CR LF collapses to one CR and bytes the
    /// keyboard can't produce are dropped.
    pub fn queue_text(&self, text: &str) {
        self.queue_bytes(text.as_bytes());
    }

    pub fn queue_bytes(&self, bytes: &[u8]) {
        let mut pending = lock(&self.pending);
        let mut iter = bytes.iter().copied().peekable();
        while let Some(byte) = iter.next() {
            if byte == b'\r' && iter.peek() == Some(&b'\n') {
                iter.next();
            }
            if let Some(code) = translate(byte) {
                pending.push_back(code);
            }
        }
    }

    /// Types the contents of `path` as keyboard input.
    pub fn queue_file(&self, path: &Path) -> Result<usize> {
        let bytes = fs::read(path).map_err(|e| EmulatorError::io(path, e))?;
        self.queue_bytes(&bytes);
        info!("Typing \"{}\" ({} bytes)", path.display(), bytes.len());
        Ok(bytes.len())
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn clear(&self) {
        lock(&self.pending).clear();
    }

    /// Injects the next queued key if the CPU has consumed the last one.
    /// Returns true if a key was handed over.
    pub fn pump(&self, pia: &Pia) -> bool {
        if pia.read_keyboard_control() != KBD_READY {
            return false;
        }
        match lock(&self.pending).pop_front() {
            Some(code) => {
                inject(pia, code);
                true
            }
            None => false,
        }
    }
}
