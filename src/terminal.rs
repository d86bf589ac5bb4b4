//! The 40x24 display terminal fed by the PIA's display port.

use std::time::{Duration, Instant};

use crate::error::{EmulatorError, Result};
use crate::metrics::record_display_byte;
use crate::pia::{Pia, DATA_READY};

pub const COLUMNS: usize = 40;
pub const ROWS: usize = 24;
pub const CARRIAGE_RETURN: u8 = 0x0D;

pub const DEFAULT_TERMINAL_SPEED: u32 = 60;
pub const MAX_TERMINAL_SPEED: u32 = 120;

/// What one consumed display byte did to the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Glyph(char),
    NewLine,
    /// Control codes other than CR are consumed but not drawn.
    Ignored,
}

pub struct Terminal {
    screen: [[u8; COLUMNS]; ROWS],
    column: usize,
    row: usize,
    /// Characters per second
    speed: u32,
    last_output: Instant,
}

impl Terminal {
    pub fn new() -> Self {
        Terminal {
            screen: [[0; COLUMNS]; ROWS],
            column: 0,
            row: 0,
            speed: DEFAULT_TERMINAL_SPEED,
            last_output: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.screen = [[0; COLUMNS]; ROWS];
        self.column = 0;
        self.row = 0;
        self.last_output = Instant::now();
    }

    pub fn set_speed(&mut self, chars_per_second: u32) -> Result<()> {
        if !(1..=MAX_TERMINAL_SPEED).contains(&chars_per_second) {
            return Err(EmulatorError::InvalidSetting {
                name: "terminalSpeed",
                value: chars_per_second.to_string(),
            });
        }
        self.speed = chars_per_second;
        Ok(())
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.column, self.row)
    }

    /// Consumes the display register if a character is waiting and writes
    /// it back with the ready bit cleared.
    pub fn poll(&mut self, pia: &Pia) -> Option<Output> {
        let dsp = pia.read_display_data();
        if dsp & DATA_READY == 0 {
            return None;
        }
        let output = self.output(dsp);
        pia.write_display_data(dsp & !DATA_READY);
        record_display_byte();
        Some(output)
    }

    pub fn output(&mut self, byte: u8) -> Output {
        let mut byte = byte & 0x7F;
        if byte >= 0x60 {
            byte &= 0x5F;
        }

        let output = match byte {
            CARRIAGE_RETURN => {
                self.column = 0;
                self.row += 1;
                Output::NewLine
            }
            0x20..=0x5F => {
                self.screen[self.row][self.column] = byte;
                self.column += 1;
                Output::Glyph(byte as char)
            }
            _ => Output::Ignored,
        };

        if self.column == COLUMNS {
            self.column = 0;
            self.row += 1;
        }
        if self.row == ROWS {
            self.scroll();
            self.row -= 1;
        }
        output
    }

    fn scroll(&mut self) {
        self.screen.copy_within(1.., 0);
        self.screen[ROWS - 1] = [0; COLUMNS];
    }

    /// How long to wait before the next character to honour the terminal
    /// speed. Marks the next character's slot as taken.
    pub fn output_delay(&mut self) -> Duration {
        let period = Duration::from_millis(1000 / self.speed as u64);
        let delay = period.saturating_sub(self.last_output.elapsed());
        self.last_output = Instant::now() + delay;
        delay
    }

    pub fn row_text(&self, row: usize) -> String {
        self.screen[row]
            .iter()
            .map(|&c| if c == 0 { ' ' } else { c as char })
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    /// The whole screen, rows joined by newlines, trailing blanks trimmed.
    pub fn text(&self) -> String {
        (0..ROWS).map(|row| self.row_text(row)).collect::<Vec<_>>().join("\n")
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}
