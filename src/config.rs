//! Persistent settings in the line-oriented `key=value` format.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EmulatorError, Result};
use crate::terminal::{DEFAULT_TERMINAL_SPEED, MAX_TERMINAL_SPEED};

pub const CONFIG_DIR: &str = ".apple1";
pub const CONFIG_FILE: &str = "apple1.cfg";
pub const ROM_DIR_ENV: &str = "APPLE1_ROMDIR";
pub const DEFAULT_ROM_DIR: &str = "roms";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub pixel_size: u8,
    pub scanlines: bool,
    /// Characters per second, 1-120
    pub terminal_speed: u32,
    pub ram8k: bool,
    pub write_in_rom: bool,
    pub fullscreen: bool,
    pub blink_cursor: bool,
    pub block_cursor: bool,
    pub krusader_rom: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pixel_size: 2,
            scanlines: false,
            terminal_speed: DEFAULT_TERMINAL_SPEED,
            ram8k: false,
            write_in_rom: true,
            fullscreen: false,
            blink_cursor: true,
            block_cursor: false,
            krusader_rom: false,
        }
    }
}

// Only bit 0 of the first character counts: "1" is set, "true" is not.
fn flag(value: &str) -> bool {
    value.bytes().next().map_or(false, |c| c & 0x01 != 0)
}

impl Settings {
    /// Parses a configuration file body on top of the defaults.
    pub fn parse(text: &str) -> Result<Self> {
        let mut settings = Settings::default();

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim_end();
            if line.is_empty() || line.starts_with('/') {
                continue;
            }
            let (key, value) = line.rsplit_once('=').ok_or_else(|| EmulatorError::Config {
                line: line_number,
                reason: format!("expected key=value, got \"{}\"", line),
            })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "pixelSize" => {
                    settings.pixel_size = value.bytes().next().map_or(0, |c| c & 0x03);
                }
                "scanlines" => settings.scanlines = flag(value),
                "terminalSpeed" => {
                    let speed: u32 = value.parse().map_err(|_| EmulatorError::Config {
                        line: line_number,
                        reason: format!("terminalSpeed \"{}\" is not a number", value),
                    })?;
                    if (1..=MAX_TERMINAL_SPEED).contains(&speed) {
                        settings.terminal_speed = speed;
                    } else {
                        warn!(
                            "Ignoring terminalSpeed={} on line {} (must be 1-{})",
                            speed, line_number, MAX_TERMINAL_SPEED
                        );
                    }
                }
                "ram8k" => settings.ram8k = flag(value),
                "writeInRom" => settings.write_in_rom = flag(value),
                "fullscreen" => settings.fullscreen = flag(value),
                "blinkCursor" => settings.blink_cursor = flag(value),
                "blockCursor" => settings.block_cursor = flag(value),
                "krusaderRom" => settings.krusader_rom = flag(value),
                other => warn!("Unknown configuration key \"{}\" on line {}", other, line_number),
            }
        }

        Ok(settings)
    }

    pub fn to_config_string(&self) -> String {
        let bit = |b: bool| if b { 1 } else { 0 };
        let mut text = String::from("// Apple 1 Configuration\n");
        let _ = writeln!(text, "pixelSize={}", self.pixel_size);
        let _ = writeln!(text, "scanlines={}", bit(self.scanlines));
        let _ = writeln!(text, "terminalSpeed={}", self.terminal_speed);
        let _ = writeln!(text, "ram8k={}", bit(self.ram8k));
        let _ = writeln!(text, "writeInRom={}", bit(self.write_in_rom));
        let _ = writeln!(text, "fullscreen={}", bit(self.fullscreen));
        let _ = writeln!(text, "blinkCursor={}", bit(self.blink_cursor));
        let _ = writeln!(text, "blockCursor={}", bit(self.block_cursor));
        let _ = writeln!(text, "krusaderRom={}", bit(self.krusader_rom));
        text
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let settings = Self::parse(&text)?;
                info!("Loaded configuration from \"{}\"", path.display());
                Ok(settings)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No configuration at \"{}\", using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(EmulatorError::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| EmulatorError::io(dir, e))?;
        }
        fs::write(path, self.to_config_string()).map_err(|e| EmulatorError::io(path, e))?;
        info!("Saved configuration to \"{}\"", path.display());
        Ok(())
    }
}

/// `$HOME/.apple1/apple1.cfg`, or `apple1.cfg` in the working directory
/// when there is no home directory.
pub fn default_config_path() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(CONFIG_DIR).join(CONFIG_FILE),
        _ => PathBuf::from(CONFIG_FILE),
    }
}

/// The command-line value wins, then `APPLE1_ROMDIR`, then `roms`.
pub fn rom_dir(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| env::var_os(ROM_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROM_DIR))
}
