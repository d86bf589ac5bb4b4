//! ROM images required to bring the machine up.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{EmulatorError, Result};
use crate::memory::Memory;

pub const MONITOR_START: u16 = 0xFF00;
pub const MONITOR_LEN: usize = 256;
pub const BASIC_START: u16 = 0xE000;
pub const BASIC_LEN: usize = 4096;
pub const KRUSADER_START: u16 = 0xE000;
pub const KRUSADER_LEN: usize = 8192;

pub const MONITOR_FILE: &str = "monitor.rom";
pub const BASIC_FILE: &str = "basic.rom";
pub const KRUSADER_FILE: &str = "krusader.rom";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomImages {
    /// Woz monitor at 0xFF00 and Integer BASIC at 0xE000.
    Standard { monitor: Vec<u8>, basic: Vec<u8> },
    /// One 8K image covering 0xE000-0xFFFF, monitor page included.
    Krusader(Vec<u8>),
}

impl RomImages {
    pub fn standard(monitor: Vec<u8>, basic: Vec<u8>) -> Result<Self> {
        check_len("monitor", &monitor, MONITOR_LEN)?;
        check_len("BASIC", &basic, BASIC_LEN)?;
        Ok(RomImages::Standard { monitor, basic })
    }

    pub fn krusader(image: Vec<u8>) -> Result<Self> {
        check_len("Krusader", &image, KRUSADER_LEN)?;
        Ok(RomImages::Krusader(image))
    }

    pub fn install(&self, memory: &Memory) -> Result<()> {
        match self {
            RomImages::Standard { monitor, basic } => {
                memory.load_image(basic, BASIC_START)?;
                memory.load_image(monitor, MONITOR_START)
            }
            RomImages::Krusader(image) => memory.load_image(image, KRUSADER_START),
        }
    }
}

fn check_len(name: &'static str, image: &[u8], expected: usize) -> Result<()> {
    if image.len() < expected {
        return Err(EmulatorError::RomTooShort { name, expected, actual: image.len() });
    }
    Ok(())
}

/// Where ROM images are read from. Images are re-read on every hard reset.
#[derive(Debug, Clone)]
pub struct RomSource {
    pub dir: PathBuf,
    pub krusader: bool,
}

impl RomSource {
    pub fn new(dir: impl Into<PathBuf>, krusader: bool) -> Self {
        RomSource { dir: dir.into(), krusader }
    }

    pub fn load(&self) -> Result<RomImages> {
        if self.krusader {
            let image = read_rom(&self.dir, KRUSADER_FILE, "Krusader", KRUSADER_LEN)?;
            return RomImages::krusader(image);
        }
        let monitor = read_rom(&self.dir, MONITOR_FILE, "monitor", MONITOR_LEN)?;
        let basic = read_rom(&self.dir, BASIC_FILE, "BASIC", BASIC_LEN)?;
        RomImages::standard(monitor, basic)
    }
}

/// Reads `file` from `dir`, keeping the first `len` bytes.
fn read_rom(dir: &Path, file: &str, name: &'static str, len: usize) -> Result<Vec<u8>> {
    let path = dir.join(file);
    let mut data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EmulatorError::RomMissing { name, path });
        }
        Err(e) => return Err(EmulatorError::io(path, e)),
    };
    check_len(name, &data, len)?;
    data.truncate(len);
    info!("Loaded {} ROM from \"{}\"", name, path.display());
    Ok(data)
}
